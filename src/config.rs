//! Relay configuration parsed from environment variables.

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8765;
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid boolean for {var}: {value:?}")]
    InvalidBool { var: String, value: String },
}

/// What to do with a connection whose path yields an empty identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyIdPolicy {
    /// Refuse the upgrade.
    Reject,
    /// Register under `""`.
    Allow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
    pub empty_id_policy: EmptyIdPolicy,
    /// Close a connection once a newer one registers under its identifier.
    pub close_superseded: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            empty_id_policy: EmptyIdPolicy::Reject,
            close_superseded: false,
        }
    }
}

impl RelayConfig {
    /// Build typed relay config from environment variables.
    ///
    /// Optional:
    /// - `RELAY_HOST`: default `127.0.0.1`
    /// - `PORT`: default 8765
    /// - `RELAY_OUTBOUND_BUFFER`: default 256, clamped to at least 1
    /// - `RELAY_ALLOW_EMPTY_ID`: default false
    /// - `RELAY_CLOSE_SUPERSEDED`: default false
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBool`] if a boolean variable holds an
    /// unrecognized value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`], reading variables through `lookup`.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("RELAY_HOST")
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or(lookup("PORT"), DEFAULT_PORT);
        let outbound_buffer = parse_or(lookup("RELAY_OUTBOUND_BUFFER"), DEFAULT_OUTBOUND_BUFFER).max(1);

        let allow_empty = parse_bool("RELAY_ALLOW_EMPTY_ID", lookup("RELAY_ALLOW_EMPTY_ID"))?;
        let close_superseded = parse_bool("RELAY_CLOSE_SUPERSEDED", lookup("RELAY_CLOSE_SUPERSEDED"))?;

        let empty_id_policy = if allow_empty { EmptyIdPolicy::Allow } else { EmptyIdPolicy::Reject };

        Ok(Self { host, port, outbound_buffer, empty_id_policy, close_superseded })
    }

    /// Socket address string for the listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_bool(var: &str, raw: Option<String>) -> Result<bool, ConfigError> {
    let Some(value) = raw else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        _ => Err(ConfigError::InvalidBool { var: var.to_string(), value }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
