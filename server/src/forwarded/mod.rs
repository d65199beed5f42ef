//! Client-facing URI reconstruction for requests that reached us through
//! one or more reverse proxies.
//!
//! ```text
//! request ─► trusted peer? ──no──────────────────────────────► next
//!                 │yes
//!                 ▼
//!          X-Forwarded-Proto ─► X-Forwarded-Port ─► X-Forwarded-Host ─► next
//! ```

pub mod ip;
pub mod request;
pub mod resolver;
pub mod uri;

pub use ip::{is_valid_ip_address, parse_ip_address};
pub use request::ForwardedRequest;
pub use resolver::{ForwardingResolver, Next, X_FORWARDED_HOST, X_FORWARDED_PORT, X_FORWARDED_PROTO};
pub use uri::ForwardedUri;
