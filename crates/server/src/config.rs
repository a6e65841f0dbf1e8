use std::{fs, path::Path, time::Duration};

use server_api::DEFAULT_QUEUE_CAPACITY;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub generation_interval_secs: u64,
    pub observer_queue_capacity: usize,
    pub static_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:3000".into(),
            generation_interval_secs: 5,
            observer_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            static_dir: "public".into(),
        }
    }
}

impl Settings {
    /// `None` when the generator is switched off.
    pub fn generation_interval(&self) -> Option<Duration> {
        (self.generation_interval_secs > 0).then(|| Duration::from_secs(self.generation_interval_secs))
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new("server.toml"), |key| std::env::var(key).ok())
}

/// Defaults, then `path` (flat TOML table), then environment. Values that do
/// not parse leave the previous setting in place.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_cfg) = toml::from_str::<toml::Table>(&raw) {
            if let Some(v) = table_value(&file_cfg, "bind_addr") {
                settings.server_bind = v;
            }
            if let Some(v) = table_value(&file_cfg, "generation_interval_secs") {
                apply_parsed(&mut settings.generation_interval_secs, &v);
            }
            if let Some(v) = table_value(&file_cfg, "observer_queue_capacity") {
                apply_parsed(&mut settings.observer_queue_capacity, &v);
            }
            if let Some(v) = table_value(&file_cfg, "static_dir") {
                settings.static_dir = v;
            }
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }
    if let Some(port) = env("PORT") {
        if port.trim().parse::<u16>().is_ok() {
            settings.server_bind = with_port(&settings.server_bind, port.trim());
        }
    }

    if let Some(v) = env("APP__GENERATION_INTERVAL_SECS") {
        apply_parsed(&mut settings.generation_interval_secs, &v);
    }
    if let Some(v) = env("APP__OBSERVER_QUEUE_CAPACITY") {
        apply_parsed(&mut settings.observer_queue_capacity, &v);
    }
    if let Some(v) = env("APP__STATIC_DIR") {
        settings.static_dir = v;
    }

    settings
}

fn table_value(table: &toml::Table, key: &str) -> Option<String> {
    match table.get(key)? {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

fn apply_parsed<T: std::str::FromStr>(target: &mut T, raw: &str) {
    if let Ok(parsed) = raw.trim().parse::<T>() {
        *target = parsed;
    }
}

fn with_port(bind: &str, port: &str) -> String {
    match bind.rsplit_once(':') {
        Some((host, _)) => format!("{host}:{port}"),
        None => format!("{bind}:{port}"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
