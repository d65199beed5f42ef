use ipnet::IpNet;
use shared::config::parse_proxy_entry;
use shared::types::{ConfigError, ProxyConfig};
use std::net::IpAddr;
use std::sync::Arc;

/// Allow-list of proxy addresses and networks.
///
/// Built once from configuration and never modified afterwards, so clones
/// share one list without locking.
#[derive(Clone, Debug, Default)]
pub struct TrustedProxies {
    networks: Arc<Vec<IpNet>>,
}

impl TrustedProxies {
    /// Build the set from IP literals and CIDR ranges. A plain address is
    /// treated as a single-host network.
    pub fn new<I, S>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let networks = entries
            .into_iter()
            .map(|entry| parse_proxy_entry(entry.as_ref()))
            .collect::<Result<Vec<IpNet>, ConfigError>>()?;

        Ok(Self {
            networks: Arc::new(networks),
        })
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self, ConfigError> {
        Self::new(&config.trusted_proxies)
    }

    /// True when `ip` equals a configured address or falls inside a
    /// configured range.
    pub fn contains(&self, ip: IpAddr) -> bool {
        let canonical = ip.to_canonical();
        self.networks
            .iter()
            .any(|net: &IpNet| net.contains(&ip) || net.contains(&canonical))
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}
