use std::path::PathBuf;

/// Students fetched per branch when a request does not say otherwise.
pub const DEFAULT_POOL_LIMIT: usize = 18;

/// Process settings, read once from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Workspace opened before the first request, if set.
    pub workspace: Option<PathBuf>,
    pub pool_limit: usize,
    /// Re-check the exclusion set under a write lock before committing.
    pub strict_allocation: bool,
    /// `tracing_subscriber::EnvFilter` directive.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            pool_limit: DEFAULT_POOL_LIMIT,
            strict_allocation: false,
            log_filter: "info".to_string(),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        Self {
            workspace: get("EXAMD_WORKSPACE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            pool_limit: get("EXAMD_POOL_LIMIT")
                .and_then(|v| v.trim().parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default.pool_limit),
            strict_allocation: get("EXAMD_STRICT_ALLOCATION")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(default.strict_allocation),
            log_filter: get("EXAMD_LOG")
                .or_else(|| get("RUST_LOG"))
                .unwrap_or(default.log_filter),
        }
    }
}
