use ipnet::IpNet;
use std::fs;
use std::net::IpAddr;
use tracing::{debug, error, info};

use crate::types::server_config::{AppConfig, ConfigError};

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    info!("Loading configuration from: {}", path);

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path);

    parse_config(&contents)
}

/// Parse and validate a configuration document that is already in memory.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let config: AppConfig = toml::from_str(contents)?;

    info!("Configuration loaded successfully");
    debug!("Config: {:?}", config);

    validate_config(&config)?;

    info!(
        "Config validated ({} trusted proxy entries)",
        config.proxy.trusted_proxies.len()
    );

    Ok(config)
}

/// Parse a trusted proxy entry: an IP literal becomes a single-host network,
/// anything else must be a CIDR range.
pub fn parse_proxy_entry(entry: &str) -> Result<IpNet, ConfigError> {
    let entry = entry.trim();

    if let Ok(ip) = entry.parse::<IpAddr>() {
        return Ok(IpNet::from(ip));
    }

    entry
        .parse::<IpNet>()
        .map_err(|_| ConfigError::InvalidTrustedProxy(entry.to_string()))
}

/// True when `entry` is an IP literal or a CIDR range.
pub fn is_valid_proxy_entry(entry: &str) -> bool {
    parse_proxy_entry(entry).is_ok()
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.bind.trim().is_empty() {
        return Err(ConfigError::InvalidConfig("bind cannot be empty".into()));
    }

    if config.server.max_connections == 0 {
        return Err(ConfigError::InvalidConfig(
            "max_connections must be greater than 0".into(),
        ));
    }

    // Rejected here so a typo fails at startup instead of silently
    // leaving a proxy untrusted.
    for entry in &config.proxy.trusted_proxies {
        parse_proxy_entry(entry)?;
    }

    Ok(())
}
