use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response, StatusCode, header};
use serde::Serialize;
use std::convert::Infallible;
use tracing::{debug, error};

use crate::forwarded::{ForwardedRequest, ForwardedUri};

/// Body returned by [`echo`]: the URI the client is taken to have requested.
#[derive(Debug, Serialize)]
pub struct EchoResponse {
    pub url: String,
    #[serde(flatten)]
    pub uri: ForwardedUri,
    pub path: String,
    pub peer: Option<String>,
}

impl EchoResponse {
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let uri = req.forwarded_uri();
        let path = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .to_string();

        Self {
            url: format!("{}{}", uri, path),
            uri,
            path,
            peer: req.peer_address(),
        }
    }
}

/// Serialize any `Serialize` type and deliver it as a JSON response.
pub fn deliver_serialized_json<T: Serialize>(
    data: &T,
    status: StatusCode,
) -> Result<Response<Full<Bytes>>> {
    let json = serde_json::to_string(data).context("Failed to serialize response")?;

    debug!("Delivering serialized JSON response, size: {} bytes", json.len());

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(json)))
        .map_err(|e| anyhow!("Failed to build JSON response: {}", e))
}

/// Answers every request with the resolved URI as JSON.
pub async fn echo<B>(req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible> {
    let body = EchoResponse::from_request(&req);

    match deliver_serialized_json(&body, StatusCode::OK) {
        Ok(response) => Ok(response),
        Err(e) => {
            error!("Echo response failed: {:#}", e);
            let mut response = Response::new(Full::new(Bytes::from_static(b"internal error")));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            Ok(response)
        }
    }
}
