//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};
use snapcart_core::AppConfig;
use snapcart_server::ServerConfig;

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    config: &AppConfig,
    host: &str,
    port: u16,
    no_encrypt: bool,
    static_dir: Option<&Path>,
) -> Result<()> {
    println!("🚀 Starting SnapCart web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);
    println!("   API: http://{}:{}/api", host, port);
    if let Some(dir) = static_dir {
        println!("   Static files: {}", dir.display());
    }
    if let Some(source) = &config.source {
        println!("   Config: {}", source.display());
    }

    let server_config = ServerConfig::from(config);
    if server_config.allowed_origins.is_empty() {
        println!("   🔒 CORS: same-origin only");
    } else {
        println!(
            "   🌐 CORS origins: {}",
            server_config.allowed_origins.join(", ")
        );
    }
    println!(
        "   📦 Max upload: {} KB",
        server_config.max_upload_bytes / 1024
    );

    let db = open_db(db_path, no_encrypt)?;

    let static_dir = static_dir
        .map(|d| d.to_str().context("Static directory path is not valid UTF-8"))
        .transpose()?;

    snapcart_server::serve_with_config(db, host, port, static_dir, server_config).await
}
