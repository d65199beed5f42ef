use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid trusted proxy entry: {0:?} is neither an IP address nor a CIDR range")]
    InvalidTrustedProxy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// How ports taken from forwarding headers are checked before they replace
/// the request URI's port.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PortPolicy {
    /// Any numeric port that fits in a `u32` is applied as-is, even when it is
    /// outside the TCP port range.
    #[default]
    Permissive,
    /// Ports outside `1..=65535` are ignored.
    Strict,
}

impl PortPolicy {
    pub fn accepts(&self, port: u32) -> bool {
        match self {
            PortPolicy::Permissive => true,
            PortPolicy::Strict => (1..=u32::from(u16::MAX)).contains(&port),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProxyConfig {
    /// Peer addresses whose `X-Forwarded-*` headers are honoured. Each entry
    /// is an IP literal (`10.0.0.1`, `::1`) or a CIDR range (`10.0.0.0/8`).
    ///
    /// An empty list trusts nobody.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    #[serde(default)]
    pub port_policy: PortPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Full bind address, e.g. `"0.0.0.0:8080"`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

pub fn default_port() -> u16 {
    8080
}

pub fn default_max_connections() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_accepts_out_of_range_ports() {
        assert!(PortPolicy::Permissive.accepts(0));
        assert!(PortPolicy::Permissive.accepts(999_999));
    }

    #[test]
    fn strict_rejects_zero_and_oversized_ports() {
        assert!(!PortPolicy::Strict.accepts(0));
        assert!(!PortPolicy::Strict.accepts(65_536));
        assert!(PortPolicy::Strict.accepts(1));
        assert!(PortPolicy::Strict.accepts(65_535));
    }

    #[test]
    fn listen_addr_joins_bind_and_port() {
        let server = ServerConfig {
            bind: "127.0.0.1".into(),
            port: 9000,
            max_connections: 10,
        };
        assert_eq!(server.listen_addr(), "127.0.0.1:9000");
    }
}
