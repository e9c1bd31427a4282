//! Process settings from the environment (after `.env` is loaded by the binary).

use crate::error::ConfigError;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 4201;
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// Postgres URL. Unset runs on the in-process store.
    pub database_url: Option<String>,
    /// Directory holding the model definition files.
    pub config_path: PathBuf,
    pub bind_addr: String,
    pub port: u16,
    /// Create schemas and tables from the model at startup.
    pub sync: bool,
    pub max_connections: u32,
    pub body_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: None,
            config_path: PathBuf::from("model"),
            bind_addr: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            sync: false,
            max_connections: 5,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Settings::default();
        Ok(Settings {
            database_url: get("DATABASE_URL"),
            config_path: get("CONFIG_PATH").map(PathBuf::from).unwrap_or(defaults.config_path),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: parse(get("SERV_PORT"), "SERV_PORT")?.unwrap_or(defaults.port),
            sync: get("SYNC").map(|v| flag(&v, "SYNC")).transpose()?.unwrap_or(defaults.sync),
            max_connections: parse(get("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            body_limit: parse(get("BODY_LIMIT_BYTES"), "BODY_LIMIT_BYTES")?.unwrap_or(defaults.body_limit),
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .map_err(|_| ConfigError::Validation(format!("invalid bind address {}:{}", self.bind_addr, self.port)))
    }
}

fn parse<T: std::str::FromStr>(value: Option<String>, key: &str) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| ConfigError::Validation(format!("{} has invalid value '{}'", key, v)))
        })
        .transpose()
}

fn flag(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(ConfigError::Validation(format!("{} has invalid value '{}'", key, other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let s = settings(&[("DATABASE_URL", "")]).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.socket_addr().unwrap().port(), 4201);
    }

    #[test]
    fn reads_every_key() {
        let s = settings(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("CONFIG_PATH", "defs"),
            ("BIND_ADDR", "127.0.0.1"),
            ("SERV_PORT", "8080"),
            ("SYNC", "true"),
            ("DB_MAX_CONNECTIONS", "12"),
            ("BODY_LIMIT_BYTES", "2048"),
        ])
        .unwrap();
        assert_eq!(s.database_url.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(s.config_path, PathBuf::from("defs"));
        assert!(s.sync);
        assert_eq!(s.max_connections, 12);
        assert_eq!(s.body_limit, 2048);
        assert_eq!(s.socket_addr().unwrap().to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(settings(&[("SERV_PORT", "http")]), Err(ConfigError::Validation(_))));
        assert!(matches!(settings(&[("SYNC", "maybe")]), Err(ConfigError::Validation(_))));
        let s = settings(&[("BIND_ADDR", "not an ip")]).unwrap();
        assert!(s.socket_addr().is_err());
    }
}
