use anyhow::{ensure, Context};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5175;
pub const DEFAULT_MAX_EVENTS: usize = 10_000;
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_QUEUE_CAPACITY: usize = 5_000;

/// Service configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Bind address. Loopback is the intended deployment; nothing in the
    /// service authenticates callers.
    pub host: String,
    pub port: u16,
    /// Ring-buffer capacity.
    pub max_events: usize,
    /// The allowed browser origin.
    pub cors_origin: String,
    /// Per-subscriber queue bound.
    pub queue_capacity: usize,
}

impl RuntimeConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match lookup("PORT") {
            Some(raw) => raw.parse().with_context(|| format!("invalid PORT: {raw:?}"))?,
            None => DEFAULT_PORT,
        };
        let max_events = match lookup("MAX_EVENTS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid MAX_EVENTS: {raw:?}"))?,
            None => DEFAULT_MAX_EVENTS,
        };
        ensure!(max_events > 0, "MAX_EVENTS must be at least 1");
        let queue_capacity = match lookup("SSE_QUEUE_CAP") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid SSE_QUEUE_CAP: {raw:?}"))?,
            None => DEFAULT_QUEUE_CAPACITY,
        };
        ensure!(queue_capacity > 0, "SSE_QUEUE_CAP must be at least 1");
        let cors_origin = lookup("CORS_ORIGIN").unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string());

        Ok(Self {
            host,
            port,
            max_events,
            cors_origin,
            queue_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_map(vars: &[(&str, &str)]) -> anyhow::Result<RuntimeConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RuntimeConfig::from_lookup(&move |key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = from_map(&[]).expect("default config");
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 5175);
        assert_eq!(cfg.max_events, 10_000);
        assert_eq!(cfg.cors_origin, "http://localhost:5173");
        assert_eq!(cfg.queue_capacity, 5_000);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = from_map(&[
            ("PORT", "9000"),
            ("HOST", "0.0.0.0"),
            ("MAX_EVENTS", "25"),
            ("SSE_QUEUE_CAP", "2"),
            ("CORS_ORIGIN", "http://localhost:3000"),
        ])
        .expect("config with overrides");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.max_events, 25);
        assert_eq!(cfg.queue_capacity, 2);
        assert_eq!(cfg.cors_origin, "http://localhost:3000");
    }

    #[test]
    fn bad_numbers_abort_startup() {
        assert!(from_map(&[("PORT", "http")]).is_err());
        assert!(from_map(&[("MAX_EVENTS", "0")]).is_err());
        assert!(from_map(&[("SSE_QUEUE_CAP", "-1")]).is_err());
    }
}
