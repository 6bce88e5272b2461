use std::{fs, time::Duration};

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Delay before a non-chatroom tab dispatches a pending batch; the
    /// chatroom tab's claim must arrive within this window to cancel it.
    pub debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self { debounce_ms: 50 }
    }
}

impl Settings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    debounce_ms: Option<u64>,
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("desk.toml") {
        if let Ok(file_cfg) = toml::from_str::<FileSettings>(&raw) {
            if let Some(v) = file_cfg.debounce_ms {
                settings.debounce_ms = v;
            }
        }
    }

    if let Ok(v) = std::env::var("DESK__DEBOUNCE_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.debounce_ms = parsed;
        }
    }

    settings
}
