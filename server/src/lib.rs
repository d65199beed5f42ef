//! Reconstructs the scheme, host and port a client originally requested
//! when the request was relayed by trusted reverse proxies.

pub mod forwarded;
pub mod handlers;
pub mod security;
pub mod tower_middle;

pub use forwarded::{ForwardedRequest, ForwardedUri, ForwardingResolver};
pub use security::TrustedProxies;
pub use tower_middle::ProxyDetectionLayer;
