/// Security module for the proxy detection server
/// Provides the trusted proxy allow-list

pub mod trusted_proxies;

pub use trusted_proxies::TrustedProxies;
