pub mod server_config;

pub use self::server_config::{AppConfig, ConfigError, PortPolicy, ProxyConfig, ServerConfig};
