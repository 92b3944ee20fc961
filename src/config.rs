use std::env;

pub struct AppConfig {
    pub device_url: String,
    pub log_name: String,
    pub chunk_limit: u64,
    pub debounce_ms: u64,
    pub live_poll_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            device_url: env_var("DEVICE_URL", "http://192.168.4.1"),
            log_name: env_var("LOG_NAME", ""),
            chunk_limit: env_var("CHUNK_LIMIT", "1000").parse().unwrap_or(1000),
            debounce_ms: env_var("DEBOUNCE_MS", "250").parse().unwrap_or(250),
            live_poll_ms: env_var("LIVE_POLL_MS", "1000").parse().unwrap_or(1000),
        }
    }
}

fn env_var(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
