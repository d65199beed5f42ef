use std::net::IpAddr;

/// Parse an IPv4 or IPv6 literal. Brackets, ports and zone ids are not
/// accepted.
pub fn parse_ip_address(value: &str) -> Option<IpAddr> {
    value.parse::<IpAddr>().ok()
}

/// True when `value` is a syntactically valid IPv4 or IPv6 address.
pub fn is_valid_ip_address(value: &str) -> bool {
    parse_ip_address(value).is_some()
}
