use shared::types::{ConfigError, PortPolicy, ProxyConfig};
use tracing::{debug, trace};

use super::ip::parse_ip_address;
use super::request::ForwardedRequest;
use super::uri::ForwardedUri;
use crate::security::TrustedProxies;

pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_PORT: &str = "x-forwarded-port";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// The rest of the pipeline, handed the (possibly rewritten) request.
pub trait Next<R, Res> {
    fn run(self, request: R, response: Res) -> Res;
}

impl<R, Res, F> Next<R, Res> for F
where
    F: FnOnce(R, Res) -> Res,
{
    fn run(self, request: R, response: Res) -> Res {
        self(request, response)
    }
}

/// Rewrites a request's scheme, host and port from `X-Forwarded-Proto`,
/// `X-Forwarded-Port` and `X-Forwarded-Host` when the request arrives from a
/// trusted proxy.
///
/// Malformed header values are ignored field by field; nothing here fails.
#[derive(Clone, Debug, Default)]
pub struct ForwardingResolver {
    trusted: TrustedProxies,
    port_policy: PortPolicy,
}

impl ForwardingResolver {
    pub fn new(trusted: TrustedProxies, port_policy: PortPolicy) -> Self {
        Self {
            trusted,
            port_policy,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            TrustedProxies::from_config(config)?,
            config.port_policy,
        ))
    }

    pub fn trusted_proxies(&self) -> &TrustedProxies {
        &self.trusted
    }

    pub fn port_policy(&self) -> PortPolicy {
        self.port_policy
    }

    /// Middleware entry point.
    ///
    /// Without a continuation the response is returned as-is. Requests from
    /// untrusted peers are passed on untouched; trusted ones are passed on
    /// with their URI rebuilt from the forwarding headers.
    pub fn handle<R, Res, N>(&self, request: R, response: Res, next: Option<N>) -> Res
    where
        R: ForwardedRequest,
        N: Next<R, Res>,
    {
        let Some(next) = next else {
            return response;
        };

        next.run(self.resolve(request), response)
    }

    /// Trust check followed by proto, port and host resolution, in that
    /// order. The host step runs last so a port carried in
    /// `X-Forwarded-Host` wins over `X-Forwarded-Port`.
    pub fn resolve<R: ForwardedRequest>(&self, request: R) -> R {
        if !self.is_proxy_trusted(&request) {
            return request;
        }

        let original = request.forwarded_uri();
        let uri = self.process_proto_header(&request, &original);
        let uri = self.process_port_header(&request, &uri);
        let uri = self.process_host_header(&request, &uri);

        if uri == original {
            return request;
        }

        debug!("Resolved forwarded URI {} -> {}", original, uri);
        request.with_forwarded_uri(uri)
    }

    /// True when the socket peer is in the trusted proxy set. A missing or
    /// unparseable peer address is never trusted.
    pub fn is_proxy_trusted<R: ForwardedRequest>(&self, request: &R) -> bool {
        let Some(peer) = request.peer_address() else {
            trace!("Request has no peer address, forwarding headers ignored");
            return false;
        };

        match parse_ip_address(&peer) {
            Some(ip) => {
                let trusted = self.trusted.contains(ip);
                trace!("Peer {} trusted: {}", ip, trusted);
                trusted
            }
            None => {
                debug!("Peer address {:?} is not an IP address", peer);
                false
            }
        }
    }

    /// Replace the scheme with the whole `X-Forwarded-Proto` value when it is
    /// exactly `http` or `https`.
    pub fn process_proto_header<R: ForwardedRequest>(
        &self,
        request: &R,
        uri: &ForwardedUri,
    ) -> ForwardedUri {
        match request.header_line(X_FORWARDED_PROTO) {
            Some(scheme) if scheme == "http" || scheme == "https" => uri.with_scheme(&scheme),
            Some(scheme) => {
                trace!("Ignoring X-Forwarded-Proto {:?}", scheme);
                uri.clone()
            }
            None => uri.clone(),
        }
    }

    /// Replace the port with the first `X-Forwarded-Port` entry when it is
    /// all digits.
    pub fn process_port_header<R: ForwardedRequest>(
        &self,
        request: &R,
        uri: &ForwardedUri,
    ) -> ForwardedUri {
        let Some(line) = request.header_line(X_FORWARDED_PORT) else {
            return uri.clone();
        };

        match parse_port(first_entry(&line)).filter(|port| self.port_policy.accepts(*port)) {
            Some(port) => uri.with_port(Some(port)),
            None => {
                trace!("Ignoring X-Forwarded-Port {:?}", line);
                uri.clone()
            }
        }
    }

    /// Replace the host with the first `X-Forwarded-Host` entry, and the port
    /// too when that entry carries a non-zero one.
    pub fn process_host_header<R: ForwardedRequest>(
        &self,
        request: &R,
        uri: &ForwardedUri,
    ) -> ForwardedUri {
        let Some(line) = request.header_line(X_FORWARDED_HOST) else {
            return uri.clone();
        };

        let (host, port) = split_host_port(first_entry(&line));
        let uri = uri.with_host(host);

        match port.filter(|port| *port != 0 && self.port_policy.accepts(*port)) {
            Some(port) => uri.with_port(Some(port)),
            None => uri,
        }
    }
}

/// Leftmost comma-separated entry, trimmed.
fn first_entry(line: &str) -> &str {
    line.split(',').next().map(trim_entry).unwrap_or("")
}

fn trim_entry(entry: &str) -> &str {
    entry.trim_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\r' | '\0' | '\x0B'))
}

/// One or more ASCII digits and nothing else.
fn parse_port(value: &str) -> Option<u32> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Integer value of the digits at the start of `value`, after optional
/// whitespace and a `+` sign. `80abc` is 80, `abc` is nothing.
fn leading_port(value: &str) -> Option<u32> {
    let value = value.trim_start_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0B' | '\x0C'));
    let value = value.strip_prefix('+').unwrap_or(value);
    let end = value
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(value.len());
    parse_port(&value[..end])
}

/// Split a forwarded host into host and port. Bracketed IPv6 literals keep
/// their brackets; anything else splits at the first colon.
fn split_host_port(entry: &str) -> (&str, Option<u32>) {
    if let Some(parts) = split_bracketed(entry) {
        return parts;
    }

    match entry.split_once(':') {
        Some((host, port)) => (host, leading_port(port)),
        None => (entry, None),
    }
}

/// `[hex:.]` optionally followed by `:digits`, with nothing after it.
fn split_bracketed(entry: &str) -> Option<(&str, Option<u32>)> {
    let close = entry.strip_prefix('[')?.find(']')? + 1;

    let literal = &entry[1..close];
    if literal.is_empty()
        || !literal
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == ':' || c == '.')
    {
        return None;
    }

    let host = &entry[..=close];
    let rest = &entry[close + 1..];
    if rest.is_empty() {
        return Some((host, None));
    }

    let digits = rest.strip_prefix(':')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some((host, digits.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, Request};
    use std::net::SocketAddr;

    const PROXY: &str = "10.0.0.1:40000";
    const STRANGER: &str = "198.51.100.7:40000";

    fn resolver() -> ForwardingResolver {
        ForwardingResolver::new(
            TrustedProxies::new(["10.0.0.1", "172.16.0.0/12"]).unwrap(),
            PortPolicy::Permissive,
        )
    }

    fn request(peer: &str, headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri("/index").header("host", "internal.local:8080");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut req = builder.body(()).unwrap();
        req.extensions_mut()
            .insert(peer.parse::<SocketAddr>().unwrap());
        req
    }

    fn strict() -> ForwardingResolver {
        ForwardingResolver::new(
            TrustedProxies::new(["10.0.0.1"]).unwrap(),
            PortPolicy::Strict,
        )
    }

    /// Appends a raw header line, which may carry obs-text bytes.
    fn with_raw_header(mut req: Request<()>, name: &'static str, value: &[u8]) -> Request<()> {
        req.headers_mut()
            .append(name, HeaderValue::from_bytes(value).unwrap());
        req
    }

    fn base() -> ForwardedUri {
        ForwardedUri::new("http", "internal.local", Some(8080))
    }

    // -- trust ---------------------------------------------------------------

    #[test]
    fn configured_peer_is_trusted() {
        assert!(resolver().is_proxy_trusted(&request(PROXY, &[])));
        assert!(resolver().is_proxy_trusted(&request("172.20.1.1:1", &[])));
    }

    #[test]
    fn unknown_peer_is_not_trusted() {
        assert!(!resolver().is_proxy_trusted(&request(STRANGER, &[])));
    }

    #[test]
    fn missing_peer_is_not_trusted() {
        let req = Request::builder().body(()).unwrap();
        assert!(!resolver().is_proxy_trusted(&req));
    }

    #[test]
    fn forwarded_for_header_does_not_grant_trust() {
        let req = request(STRANGER, &[("x-forwarded-for", "10.0.0.1")]);
        assert!(!resolver().is_proxy_trusted(&req));
    }

    // -- proto ---------------------------------------------------------------

    #[test]
    fn proto_https_replaces_scheme() {
        let req = request(PROXY, &[("x-forwarded-proto", "https")]);
        assert_eq!(resolver().process_proto_header(&req, &base()).scheme(), "https");
    }

    #[test]
    fn proto_is_case_sensitive() {
        let req = request(PROXY, &[("x-forwarded-proto", "HTTPS")]);
        assert_eq!(resolver().process_proto_header(&req, &base()), base());
    }

    #[test]
    fn proto_list_is_not_split() {
        let req = request(PROXY, &[("x-forwarded-proto", "https, http")]);
        assert_eq!(resolver().process_proto_header(&req, &base()), base());
    }

    #[test]
    fn proto_repeated_header_is_ignored() {
        let req = request(
            PROXY,
            &[("x-forwarded-proto", "https"), ("x-forwarded-proto", "https")],
        );
        assert_eq!(resolver().process_proto_header(&req, &base()), base());
    }

    #[test]
    fn proto_with_non_ascii_line_before_https_is_ignored() {
        let req = with_raw_header(request(PROXY, &[]), "x-forwarded-proto", b"h\xe4ttps");
        let req = with_raw_header(req, "x-forwarded-proto", b"https");
        assert_eq!(resolver().process_proto_header(&req, &base()), base());
    }

    #[test]
    fn proto_unknown_scheme_is_ignored() {
        for value in ["ftp", "", " https"] {
            let req = request(PROXY, &[("x-forwarded-proto", value)]);
            assert_eq!(resolver().process_proto_header(&req, &base()), base(), "{:?}", value);
        }
    }

    // -- port ----------------------------------------------------------------

    #[test]
    fn port_takes_first_entry() {
        let req = request(PROXY, &[("x-forwarded-port", "8443, 9000")]);
        assert_eq!(resolver().process_port_header(&req, &base()).port(), Some(8443));
    }

    #[test]
    fn port_non_numeric_is_ignored() {
        for value in ["abc", "", "80a", "-80", "8 0"] {
            let req = request(PROXY, &[("x-forwarded-port", value)]);
            assert_eq!(resolver().process_port_header(&req, &base()), base(), "{:?}", value);
        }
    }

    #[test]
    fn port_out_of_range_is_kept_when_permissive() {
        let req = request(PROXY, &[("x-forwarded-port", "999999")]);
        assert_eq!(resolver().process_port_header(&req, &base()).port(), Some(999_999));
    }

    #[test]
    fn port_out_of_range_is_ignored_when_strict() {
        let req = request(PROXY, &[("x-forwarded-port", "999999")]);
        assert_eq!(strict().process_port_header(&req, &base()), base());
    }

    #[test]
    fn port_overflowing_u32_is_ignored() {
        let req = request(PROXY, &[("x-forwarded-port", "99999999999")]);
        assert_eq!(resolver().process_port_header(&req, &base()), base());
    }

    // -- host ----------------------------------------------------------------

    #[test]
    fn host_with_port_sets_both() {
        let req = request(PROXY, &[("x-forwarded-host", "example.com:8080")]);
        let uri = resolver().process_host_header(&req, &base().with_port(None));
        assert_eq!(uri.host(), "example.com");
        assert_eq!(uri.port(), Some(8080));
    }

    #[test]
    fn bracketed_ipv6_host_keeps_brackets() {
        let req = request(PROXY, &[("x-forwarded-host", "[2001:db8::1]:443")]);
        let uri = resolver().process_host_header(&req, &base());
        assert_eq!(uri.host(), "[2001:db8::1]");
        assert_eq!(uri.port(), Some(443));
    }

    #[test]
    fn bracketed_ipv6_without_port_keeps_previous_port() {
        let req = request(PROXY, &[("x-forwarded-host", "[::1]")]);
        let uri = resolver().process_host_header(&req, &base());
        assert_eq!(uri.host(), "[::1]");
        assert_eq!(uri.port(), Some(8080));
    }

    #[test]
    fn host_without_port_keeps_previous_port() {
        let req = request(PROXY, &[("x-forwarded-host", "example.com")]);
        let uri = resolver().process_host_header(&req, &base());
        assert_eq!(uri.host(), "example.com");
        assert_eq!(uri.port(), Some(8080));
    }

    #[test]
    fn host_takes_first_entry() {
        let req = request(PROXY, &[("x-forwarded-host", " example.com , proxy.local:81")]);
        let uri = resolver().process_host_header(&req, &base());
        assert_eq!(uri.host(), "example.com");
        assert_eq!(uri.port(), Some(8080));
    }

    #[test]
    fn host_zero_or_empty_port_is_ignored() {
        for value in ["example.com:0", "example.com:", "example.com:abc", "[::1]:0"] {
            let req = request(PROXY, &[("x-forwarded-host", value)]);
            assert_eq!(resolver().process_host_header(&req, &base()).port(), Some(8080), "{:?}", value);
        }
    }

    #[test]
    fn host_port_uses_leading_digits() {
        let req = request(PROXY, &[("x-forwarded-host", "example.com:81abc")]);
        assert_eq!(resolver().process_host_header(&req, &base()).port(), Some(81));
    }

    #[test]
    fn host_port_stops_at_first_non_digit() {
        let req = request(PROXY, &[("x-forwarded-host", "example.com:1e3")]);
        assert_eq!(resolver().process_host_header(&req, &base()).port(), Some(1));
    }

    #[test]
    fn host_out_of_range_port_is_ignored_when_strict() {
        for (value, host) in [("example.com:70000", "example.com"), ("[::1]:70000", "[::1]")] {
            let req = request(PROXY, &[("x-forwarded-host", value)]);
            let uri = strict().process_host_header(&req, &base());
            assert_eq!(uri.host(), host, "{:?}", value);
            assert_eq!(uri.port(), Some(8080), "{:?}", value);
        }
    }

    #[test]
    fn host_out_of_range_port_is_kept_when_permissive() {
        let req = request(PROXY, &[("x-forwarded-host", "[::1]:70000")]);
        assert_eq!(resolver().process_host_header(&req, &base()).port(), Some(70_000));
    }

    #[test]
    fn host_with_non_ascii_first_line_is_not_replaced_by_second() {
        let req = with_raw_header(request(PROXY, &[]), "x-forwarded-host", b"caf\xe9.example");
        let req = with_raw_header(req, "x-forwarded-host", b"attacker.example");
        let uri = resolver().process_host_header(&req, &base());
        assert_eq!(uri.host(), "caf\u{FFFD}.example");
        assert_eq!(uri.port(), Some(8080));
    }

    #[test]
    fn unterminated_bracket_falls_back_to_first_colon() {
        let req = request(PROXY, &[("x-forwarded-host", "[2001:db8::1:443")]);
        let uri = resolver().process_host_header(&req, &base());
        assert_eq!(uri.host(), "[2001");
        assert_eq!(uri.port(), Some(8080));
    }

    #[test]
    fn bare_ipv6_splits_at_first_colon() {
        let req = request(PROXY, &[("x-forwarded-host", "2001:db8::1")]);
        let uri = resolver().process_host_header(&req, &base());
        assert_eq!(uri.host(), "2001");
        assert_eq!(uri.port(), Some(8080));
    }

    #[test]
    fn bracketed_host_with_trailing_garbage_is_not_bracket_form() {
        let req = request(PROXY, &[("x-forwarded-host", "[::1]x")]);
        let uri = resolver().process_host_header(&req, &base());
        assert_eq!(uri.host(), "[");
    }

    // -- orchestration -------------------------------------------------------

    #[test]
    fn host_port_supersedes_port_header() {
        let req = request(
            PROXY,
            &[
                ("x-forwarded-proto", "https"),
                ("x-forwarded-port", "8443"),
                ("x-forwarded-host", "example.com:9443"),
            ],
        );
        let uri = resolver().resolve(req).forwarded_uri();
        assert_eq!(uri, ForwardedUri::new("https", "example.com", Some(9443)));
    }

    #[test]
    fn port_header_survives_host_without_port() {
        let req = request(
            PROXY,
            &[
                ("x-forwarded-proto", "https"),
                ("x-forwarded-port", "8443"),
                ("x-forwarded-host", "example.com"),
            ],
        );
        let uri = resolver().resolve(req).forwarded_uri();
        assert_eq!(uri, ForwardedUri::new("https", "example.com", Some(8443)));
    }

    #[test]
    fn untrusted_request_is_passed_unchanged() {
        let req = request(
            STRANGER,
            &[("x-forwarded-proto", "https"), ("x-forwarded-host", "evil.example")],
        );
        let resolved = resolver().resolve(req);
        assert_eq!(resolved.uri(), "/index");
        assert!(resolved.extensions().get::<ForwardedUri>().is_none());
        assert_eq!(resolved.forwarded_uri(), base());
    }

    #[test]
    fn trusted_request_without_headers_keeps_uri() {
        let resolved = resolver().resolve(request(PROXY, &[]));
        assert_eq!(resolved.uri(), "/index");
        assert_eq!(resolved.forwarded_uri(), base());
    }

    #[test]
    fn handle_without_next_returns_response() {
        let req = request(PROXY, &[("x-forwarded-proto", "https")]);
        let next: Option<fn(Request<()>, &'static str) -> &'static str> = None;
        assert_eq!(resolver().handle(req, "untouched", next), "untouched");
    }

    #[test]
    fn handle_passes_rewritten_request_to_next() {
        let req = request(PROXY, &[("x-forwarded-proto", "https")]);
        let out = resolver().handle(
            req,
            String::new(),
            Some(|req: Request<()>, _res: String| req.forwarded_uri().to_string()),
        );
        assert_eq!(out, "https://internal.local:8080");
    }

    #[test]
    fn handle_passes_untrusted_request_to_next() {
        let req = request(STRANGER, &[("x-forwarded-proto", "https")]);
        let out = resolver().handle(
            req,
            0usize,
            Some(|req: Request<()>, res: usize| {
                assert_eq!(req.uri(), "/index");
                res + 1
            }),
        );
        assert_eq!(out, 1);
    }

    #[test]
    fn from_config_uses_port_policy() {
        let config = ProxyConfig {
            trusted_proxies: vec!["10.0.0.1".into()],
            port_policy: PortPolicy::Strict,
        };
        let resolver = ForwardingResolver::from_config(&config).unwrap();
        assert_eq!(resolver.port_policy(), PortPolicy::Strict);
        assert_eq!(resolver.trusted_proxies().len(), 1);
    }
}
