//! Astral web service CLI
//!
//! Run with: cargo run --bin astral-web -- <command>
//! Or after build: ./target/release/astral-web <command>

#[tokio::main]
async fn main() {
    // Load .env file as early as possible so ASTRAL_* overrides apply
    let _ = dotenvy::dotenv();

    if let Err(e) = astral_web::cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
