use serde::Serialize;
use std::fmt;

/// The scheme, host and port of a request as the client saw it.
///
/// Values are never changed in place: every `with_*` call returns a new
/// `ForwardedUri` and leaves the receiver as it was.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ForwardedUri {
    scheme: String,
    host: String,
    port: Option<u32>,
}

impl ForwardedUri {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: Option<u32>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host name or address. IPv6 literals keep their brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, `None` meaning "default for the scheme".
    pub fn port(&self) -> Option<u32> {
        self.port
    }

    pub fn with_scheme(&self, scheme: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            ..self.clone()
        }
    }

    pub fn with_host(&self, host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..self.clone()
        }
    }

    pub fn with_port(&self, port: Option<u32>) -> Self {
        Self {
            port,
            ..self.clone()
        }
    }

    /// Well-known port for the scheme, if it has one.
    pub fn default_port(&self) -> Option<u32> {
        match self.scheme.as_str() {
            "http" => Some(80),
            "https" => Some(443),
            _ => None,
        }
    }

    /// The port to render in an authority: `None` when it is absent or equal
    /// to the scheme default.
    pub fn explicit_port(&self) -> Option<u32> {
        self.port.filter(|port| Some(*port) != self.default_port())
    }

    /// `host[:port]`, omitting a default port.
    pub fn authority(&self) -> String {
        match self.explicit_port() {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

impl fmt::Display for ForwardedUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority())
    }
}
