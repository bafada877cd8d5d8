use super::*;
use chrono::Duration;
use tempfile::TempDir;

pub(crate) fn sample_code(code: &str, now: DateTime<Utc>) -> AuthorizationCode {
    AuthorizationCode {
        code: code.to_string(),
        client_id: "astral-launcher".to_string(),
        user_id: "user-1".to_string(),
        redirect_uri: "astral-ai://callback".to_string(),
        scope: "profile".to_string(),
        state: Some("xyz".to_string()),
        access_credential: Some("jwt-user-1".to_string()),
        used: false,
        expires_at: now + Duration::seconds(600),
        created_at: now,
    }
}

pub(crate) fn sample_record(access: &str, refresh: &str, now: DateTime<Utc>) -> OAuthTokenRecord {
    OAuthTokenRecord::issue(
        access.to_string(),
        refresh.to_string(),
        "user-1".to_string(),
        "astral-launcher".to_string(),
        "profile".to_string(),
        now,
    )
}

/// Runs every storage operation the OAuth flow uses.
/// Used to ensure parity between Memory and SQLite implementations
async fn test_all_storage_operations<S: OAuthStorage>(storage: Arc<S>) {
    let now = Utc::now();

    // Codes: insert, find, consume once
    storage
        .insert_authorization_code(&sample_code("ac_one", now))
        .await
        .expect("insert code should succeed");

    let found = storage
        .find_unused_authorization_code("ac_one", "astral-launcher")
        .await
        .expect("find should succeed")
        .expect("code should be redeemable");
    assert_eq!(found.code.user_id, "user-1");
    assert_eq!(found.code.access_credential.as_deref(), Some("jwt-user-1"));
    assert_eq!(found.code.state.as_deref(), Some("xyz"));
    assert!(found.user.is_none(), "No profile row saved yet");

    let wrong_client = storage
        .find_unused_authorization_code("ac_one", "other-client")
        .await
        .expect("find should succeed");
    assert!(wrong_client.is_none(), "Code is bound to its client");

    assert!(storage.mark_authorization_code_used("ac_one").await.unwrap());
    assert!(
        !storage.mark_authorization_code_used("ac_one").await.unwrap(),
        "Second consume must report no change"
    );
    assert!(
        storage
            .find_unused_authorization_code("ac_one", "astral-launcher")
            .await
            .unwrap()
            .is_none()
    );
    let used = storage.get_authorization_code("ac_one").await.unwrap().unwrap();
    assert!(used.used);

    storage.delete_authorization_code("ac_one").await.unwrap();
    assert!(storage.get_authorization_code("ac_one").await.unwrap().is_none());

    // Profiles join into redemption
    storage
        .save_user_profile(&UserProfile {
            id: "user-1".to_string(),
            username: Some("steve".to_string()),
            email: Some("steve@example.com".to_string()),
            avatar_url: None,
        })
        .await
        .unwrap();
    storage
        .insert_authorization_code(&sample_code("ac_two", now))
        .await
        .unwrap();
    let joined = storage
        .find_unused_authorization_code("ac_two", "astral-launcher")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        joined.user.and_then(|u| u.username).as_deref(),
        Some("steve")
    );

    // Tokens: insert, collapse on access credential, update in place
    let record = sample_record("jwt-user-1", "rt_first", now);
    assert_eq!(
        storage.insert_oauth_token(&record).await.unwrap(),
        TokenInsert::Inserted
    );

    let again = sample_record("jwt-user-1", "rt_second", now);
    assert_eq!(
        storage.insert_oauth_token(&again).await.unwrap(),
        TokenInsert::AccessTokenExists
    );
    assert!(storage.update_oauth_token_by_access(&again).await.unwrap());

    let stored = storage
        .get_oauth_token_by_access("jwt-user-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.refresh_token, "rt_second");

    assert!(
        !storage
            .update_oauth_token_by_access(&sample_record("missing", "rt_x", now))
            .await
            .unwrap()
    );

    // Refresh lookup is scoped by client
    assert!(
        storage
            .find_oauth_token_by_refresh("rt_second", "astral-launcher")
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        storage
            .find_oauth_token_by_refresh("rt_second", "other-client")
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        storage
            .find_oauth_token_by_refresh("rt_first", "astral-launcher")
            .await
            .unwrap()
            .is_none()
    );

    // Rotation is a compare-and-set on the old refresh token
    let (exp, refresh_exp) = token_expiries(now);
    assert!(
        storage
            .rotate_refresh_token("rt_second", "astral-launcher", "rt_third", exp, refresh_exp)
            .await
            .unwrap()
    );
    assert!(
        !storage
            .rotate_refresh_token("rt_second", "astral-launcher", "rt_fourth", exp, refresh_exp)
            .await
            .unwrap(),
        "Stale refresh token must lose"
    );
    let rotated = storage
        .get_oauth_token_by_access("jwt-user-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rotated.refresh_token, "rt_third");

    storage.delete_oauth_token_by_refresh("rt_third").await.unwrap();
    assert!(
        storage
            .get_oauth_token_by_access("jwt-user-1")
            .await
            .unwrap()
            .is_none()
    );
}

async fn test_refresh_token_collision_is_an_error<S: OAuthStorage>(storage: Arc<S>) {
    let now = Utc::now();
    storage
        .insert_oauth_token(&sample_record("jwt-a", "rt_same", now))
        .await
        .unwrap();

    let result = storage
        .insert_oauth_token(&sample_record("jwt-b", "rt_same", now))
        .await;
    assert!(result.is_err(), "Refresh token conflict is not a redemption retry");
}

async fn test_purge_expired<S: OAuthStorage>(storage: Arc<S>) {
    let now = Utc::now();

    let mut stale = sample_code("ac_stale", now - Duration::seconds(1200));
    stale.expires_at = now - Duration::seconds(600);
    storage.insert_authorization_code(&stale).await.unwrap();
    storage
        .insert_authorization_code(&sample_code("ac_fresh", now))
        .await
        .unwrap();

    let old = sample_record("jwt-old", "rt_old", now - Duration::days(8));
    storage.insert_oauth_token(&old).await.unwrap();
    storage
        .insert_oauth_token(&sample_record("jwt-new", "rt_new", now))
        .await
        .unwrap();

    let report = storage.purge_expired(now).await.unwrap();
    assert_eq!(report, PurgeReport { codes: 1, tokens: 1 });

    assert!(storage.get_authorization_code("ac_stale").await.unwrap().is_none());
    assert!(storage.get_authorization_code("ac_fresh").await.unwrap().is_some());
    assert!(storage.get_oauth_token_by_access("jwt-old").await.unwrap().is_none());
    assert!(storage.get_oauth_token_by_access("jwt-new").await.unwrap().is_some());
}

/// Many concurrent consumers of one code: exactly one CAS wins
async fn test_concurrent_code_consumption<S: OAuthStorage + 'static>(storage: Arc<S>) {
    storage
        .insert_authorization_code(&sample_code("ac_race", Utc::now()))
        .await
        .unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let storage = storage.clone();
            tokio::spawn(async move { storage.mark_authorization_code_used("ac_race").await })
        })
        .collect();

    let mut wins = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);
}

/// Concurrent rotations of the same refresh token: exactly one succeeds
async fn test_concurrent_rotation<S: OAuthStorage + 'static>(storage: Arc<S>) {
    let now = Utc::now();
    storage
        .insert_oauth_token(&sample_record("jwt-rot", "rt_rot", now))
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let storage = storage.clone();
            tokio::spawn(async move {
                let (exp, refresh_exp) = token_expiries(Utc::now());
                storage
                    .rotate_refresh_token(
                        "rt_rot",
                        "astral-launcher",
                        &format!("rt_next_{i}"),
                        exp,
                        refresh_exp,
                    )
                    .await
            })
        })
        .collect();

    let mut wins = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);

    let record = storage
        .get_oauth_token_by_access("jwt-rot")
        .await
        .unwrap()
        .unwrap();
    assert!(record.refresh_token.starts_with("rt_next_"));
}

async fn test_update_is_bound_to_client<S: OAuthStorage>(storage: Arc<S>) {
    let now = Utc::now();
    storage
        .insert_oauth_token(&sample_record("jwt-shared", "rt_launcher", now))
        .await
        .unwrap();

    let mut other = sample_record("jwt-shared", "rt_companion", now);
    other.client_id = "astral-companion".to_string();
    assert!(!storage.update_oauth_token_by_access(&other).await.unwrap());

    let record = storage
        .get_oauth_token_by_access("jwt-shared")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.client_id, "astral-launcher");
    assert_eq!(record.refresh_token, "rt_launcher");

    let same = sample_record("jwt-shared", "rt_launcher_2", now);
    assert!(storage.update_oauth_token_by_access(&same).await.unwrap());
}

async fn test_concurrent_refresh_collision<S: OAuthStorage + 'static>(storage: Arc<S>) {
    let now = Utc::now();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let storage = storage.clone();
            tokio::spawn(async move {
                storage
                    .insert_oauth_token(&sample_record(&format!("jwt-{i}"), "rt_contended", now))
                    .await
            })
        })
        .collect();

    let mut inserted = 0;
    for handle in handles {
        if let Ok(TokenInsert::Inserted) = handle.await.unwrap() {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 1);
}

async fn sqlite_file_storage(dir: &TempDir) -> Arc<SqliteStorage> {
    let path = dir.path().join("astral.db");
    Arc::new(
        SqliteStorage::new(path.to_str().unwrap())
            .await
            .expect("SQLite creation failed"),
    )
}

#[tokio::test]
async fn test_memory_storage_all_operations() {
    test_all_storage_operations(Arc::new(MemoryStorage::new())).await;
}

#[tokio::test]
async fn test_sqlite_storage_all_operations() {
    let storage = SqliteStorage::new(":memory:")
        .await
        .expect("SQLite creation failed");
    test_all_storage_operations(Arc::new(storage)).await;
}

#[tokio::test]
async fn test_memory_refresh_collision() {
    test_refresh_token_collision_is_an_error(Arc::new(MemoryStorage::new())).await;
}

#[tokio::test]
async fn test_sqlite_refresh_collision() {
    let storage = SqliteStorage::new(":memory:").await.unwrap();
    test_refresh_token_collision_is_an_error(Arc::new(storage)).await;
}

#[tokio::test]
async fn test_memory_purge_expired() {
    test_purge_expired(Arc::new(MemoryStorage::new())).await;
}

#[tokio::test]
async fn test_sqlite_purge_expired() {
    let storage = SqliteStorage::new(":memory:").await.unwrap();
    test_purge_expired(Arc::new(storage)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_concurrent_code_consumption() {
    test_concurrent_code_consumption(Arc::new(MemoryStorage::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_concurrent_code_consumption() {
    let dir = TempDir::new().unwrap();
    test_concurrent_code_consumption(sqlite_file_storage(&dir).await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_concurrent_rotation() {
    test_concurrent_rotation(Arc::new(MemoryStorage::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_concurrent_rotation() {
    let dir = TempDir::new().unwrap();
    test_concurrent_rotation(sqlite_file_storage(&dir).await).await;
}

#[tokio::test]
async fn test_memory_update_is_bound_to_client() {
    test_update_is_bound_to_client(Arc::new(MemoryStorage::new())).await;
}

#[tokio::test]
async fn test_sqlite_update_is_bound_to_client() {
    let storage = SqliteStorage::new(":memory:").await.unwrap();
    test_update_is_bound_to_client(Arc::new(storage)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_concurrent_refresh_collision() {
    test_concurrent_refresh_collision(Arc::new(MemoryStorage::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_concurrent_refresh_collision() {
    let dir = TempDir::new().unwrap();
    test_concurrent_refresh_collision(sqlite_file_storage(&dir).await).await;
}
