use http::header::HOST;
use http::uri::Authority;
use std::net::SocketAddr;
use tracing::warn;

use super::uri::ForwardedUri;

/// What the resolver needs from a request: header lookup, the socket peer
/// address and the request URI.
///
/// Header names are matched case-insensitively. The peer address must come
/// from the connection itself, never from a header.
pub trait ForwardedRequest: Sized {
    fn has_header(&self, name: &str) -> bool;

    /// Every value of the header joined with `", "`, or `None` when the
    /// header is absent.
    fn header_line(&self, name: &str) -> Option<String>;

    /// IP address of the directly connected peer.
    fn peer_address(&self) -> Option<String>;

    fn forwarded_uri(&self) -> ForwardedUri;

    /// Consume the request and return it with `uri` attached.
    fn with_forwarded_uri(self, uri: ForwardedUri) -> Self;
}

/// Peer address and URI are read the way the connection loop records them:
/// a `SocketAddr` in the request extensions, and a `ForwardedUri` extension
/// once the request has been resolved.
impl<B> ForwardedRequest for http::Request<B> {
    fn has_header(&self, name: &str) -> bool {
        self.headers().contains_key(name)
    }

    fn header_line(&self, name: &str) -> Option<String> {
        if !self.has_header(name) {
            return None;
        }

        // Lines with obs-text bytes stay in place so the leftmost entry is
        // still the one the proxy sent first.
        let values: Vec<String> = self
            .headers()
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();

        Some(values.join(", "))
    }

    fn peer_address(&self) -> Option<String> {
        self.extensions()
            .get::<SocketAddr>()
            .map(|addr| addr.ip().to_string())
    }

    fn forwarded_uri(&self) -> ForwardedUri {
        if let Some(uri) = self.extensions().get::<ForwardedUri>() {
            return uri.clone();
        }

        let scheme = self.uri().scheme_str().unwrap_or("http");

        // Origin-form requests carry the authority in the Host header.
        let authority = self.uri().authority().cloned().or_else(|| {
            self.headers()
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<Authority>().ok())
        });

        match authority {
            Some(authority) => ForwardedUri::new(
                scheme,
                authority.host(),
                authority.port_u16().map(u32::from),
            ),
            None => ForwardedUri::new(scheme, "", None),
        }
    }

    fn with_forwarded_uri(mut self, uri: ForwardedUri) -> Self {
        let path_and_query = self
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .to_string();

        let rebuilt = http::Uri::builder()
            .scheme(uri.scheme())
            .authority(uri.authority())
            .path_and_query(path_and_query)
            .build();

        match rebuilt {
            Ok(rebuilt) => *self.uri_mut() = rebuilt,
            Err(e) => warn!(
                "Resolved URI {} cannot be expressed as a request URI, keeping {}: {}",
                uri,
                self.uri(),
                e
            ),
        }

        self.extensions_mut().insert(uri);
        self
    }
}
