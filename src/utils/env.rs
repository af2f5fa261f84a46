// src/utils/env.rs
use log::{debug, info};
use std::env;
use std::str::FromStr;

/// Loads variables from `.env` (or `ENV_FILE`) without overriding the process environment.
pub fn load_env() {
    let file = env::var("ENV_FILE").unwrap_or_else(|_| ".env".to_string());
    match dotenv::from_filename(&file) {
        Ok(path) => info!("Loaded environment variables from {}", path.display()),
        Err(e) => debug!(
            "No env file loaded from '{}' ({}). Proceeding with system environment variables.",
            file, e
        ),
    }
}

/// Reads and parses `key`, falling back to `default` when unset or unparsable.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Reads a comma-separated list, trimming entries and dropping blanks.
pub fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}
