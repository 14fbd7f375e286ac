use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub chat_token: String,
    pub chat_api_base: String,
    pub store_path: PathBuf,
    pub feed_url: String,
    pub market_host: String,
    pub api_bind: String,
    pub feed_queue: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let chat_token = std::env::var("SKINTRACK_CHAT_TOKEN")
            .or_else(|_| std::env::var("DISCORD_BOT_TOKEN"))?;
        let chat_api_base = std::env::var("SKINTRACK_CHAT_API")
            .unwrap_or_else(|_| "https://discord.com/api/v10".to_string());
        let store_path = std::env::var("SKINTRACK_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("threads.json"));
        let feed_url = std::env::var("SKINTRACK_FEED_URL")
            .unwrap_or_else(|_| "wss://skinport.com/socket".to_string());
        let market_host =
            std::env::var("SKINTRACK_MARKET_HOST").unwrap_or_else(|_| "skinport.com".to_string());
        let api_bind =
            std::env::var("SKINTRACK_API_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let feed_queue = std::env::var("SKINTRACK_FEED_QUEUE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(256);

        Ok(Self {
            chat_token,
            chat_api_base,
            store_path,
            feed_url,
            market_host,
            api_bind,
            feed_queue,
        })
    }
}
