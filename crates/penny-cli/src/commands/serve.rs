//! Server command implementation

use anyhow::Result;
use penny_core::Settings;
use penny_server::ServerConfig;

use super::open_penny;

pub async fn cmd_serve(settings: Settings, host: &str, port: u16) -> Result<()> {
    let config = ServerConfig::from_settings(&settings.server);

    println!("🚀 Starting Penny web server...");
    println!("   Data directory: {}", settings.data_dir.display());
    println!("   Listening: http://{}:{}", host, port);
    println!("   AI backend: {}", settings.ai.backend.as_str());

    if config.require_auth() {
        println!(
            "   🔑 API keys: {} configured (PENNY_API_KEYS)",
            config.api_keys.len()
        );
    } else {
        println!();
        println!("   ⚠️  Authentication DISABLED (set PENNY_API_KEYS) - do not expose to network!");
    }

    if config.allow_any_origin {
        println!("   🌐 CORS: any origin");
    } else if !config.allowed_origins.is_empty() {
        println!("   🌐 CORS: {}", config.allowed_origins.join(", "));
    }
    println!();

    let penny = open_penny(settings)?;
    penny_server::serve(penny, host, port, config).await
}
