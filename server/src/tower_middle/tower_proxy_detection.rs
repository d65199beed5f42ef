use hyper::Request;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::forwarded::ForwardingResolver;

/// Tower layer for proxy detection
///
/// This wraps any service and rewrites the request URI from the
/// `X-Forwarded-*` headers before the inner service sees it, provided the
/// connecting peer is a trusted proxy.
#[derive(Clone)]
pub struct ProxyDetectionLayer {
    resolver: ForwardingResolver,
}

impl ProxyDetectionLayer {
    pub fn new(resolver: ForwardingResolver) -> Self {
        Self { resolver }
    }
}

impl<S> Layer<S> for ProxyDetectionLayer {
    type Service = ProxyDetectionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ProxyDetectionService {
            inner,
            resolver: self.resolver.clone(),
        }
    }
}

/// The actual service that resolves forwarded requests
#[derive(Clone)]
pub struct ProxyDetectionService<S> {
    inner: S,
    resolver: ForwardingResolver,
}

impl<S, ReqBody> Service<Request<ReqBody>> for ProxyDetectionService<S>
where
    S: Service<Request<ReqBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // Peer address comes from extensions (set by connection handler)
        let req = self.resolver.resolve(req);
        self.inner.call(req)
    }
}
