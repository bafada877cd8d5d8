use crate::auth::codec::{generate_auth_code, generate_refresh_token, is_well_formed_credential};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::collections::HashSet;

#[test]
fn test_refresh_token_shape() {
    let token = generate_refresh_token();
    let body = token.strip_prefix("rt_").expect("refresh prefix");
    // 48 bytes -> 64 base64 chars without padding
    assert_eq!(body.len(), 64);
    assert!(!body.contains('='));
    assert_eq!(URL_SAFE_NO_PAD.decode(body).unwrap().len(), 48);
}

#[test]
fn test_auth_code_shape() {
    let code = generate_auth_code();
    let body = code.strip_prefix("ac_").expect("code prefix");
    assert_eq!(URL_SAFE_NO_PAD.decode(body).unwrap().len(), 32);
}

#[test]
fn test_tokens_are_unique() {
    let tokens: HashSet<String> = (0..500).map(|_| generate_refresh_token()).collect();
    assert_eq!(tokens.len(), 500);
}

#[test]
fn test_well_formed_credential() {
    assert!(is_well_formed_credential("eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJ1In0.c2ln-_x"));
    assert!(!is_well_formed_credential(""));
    assert!(!is_well_formed_credential("rt_abc"));
    assert!(!is_well_formed_credential("a..c"));
    assert!(!is_well_formed_credential("a.b.c.d"));
    assert!(!is_well_formed_credential("a.b+/.c"));
}
