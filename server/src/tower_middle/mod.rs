/// Tower middleware module
///
/// This module contains Tower-based middleware layers for:
/// - Proxy detection (X-Forwarded-* resolution)
pub mod tower_proxy_detection;

pub use tower_proxy_detection::{ProxyDetectionLayer, ProxyDetectionService};
