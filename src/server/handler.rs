// Axum front: turns incoming HTTP requests into fetch events on the registration.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use reqwest::Url;
use tokio::net::TcpListener;
use tracing::{debug, error};

use crate::config::SERVED_FROM_HEADER;
use crate::error::EngineError;
use crate::host::registration::Registration;
use crate::types::{FetchRequest, FetchResponse};

/// Response headers describing the original transfer, not the body we replay.
const HOP_BY_HOP_HEADERS: [HeaderName; 3] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::CONTENT_LENGTH,
];

#[derive(Clone)]
struct AppState {
    registration: Arc<Registration>,
    origin: Url,
}

pub struct OfflineServer {
    port: u16,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl OfflineServer {
    /// Bind `addr` and serve every path of `origin` through `registration`.
    pub async fn start(addr: &str, registration: Arc<Registration>, origin: &str) -> Result<Self> {
        let origin = Url::parse(origin).map_err(|e| anyhow!("invalid origin {}: {}", origin, e))?;

        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let app = Router::new()
            .fallback(fetch_handler)
            .with_state(AppState { registration, origin });

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Ok(Self {
            port,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Local URL serving `path`.
    pub fn url_for(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// Shutdown the server gracefully.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Map a local request URI onto the app origin.
///
/// Only the path and query are taken from the request, so a `//host/...`
/// path stays on the origin instead of being read as a scheme-relative URL.
fn origin_url(origin: &Url, uri: &Uri) -> Result<Url> {
    if origin.cannot_be_a_base() {
        return Err(EngineError::InvalidUrl(format!("origin {} cannot be a base", origin)).into());
    }
    let mut url = origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    url.set_fragment(None);
    Ok(url)
}

fn into_http_response(resp: FetchResponse) -> Response {
    let mut headers = resp.headers;
    for name in &HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
    headers.insert(
        HeaderName::from_static(SERVED_FROM_HEADER),
        HeaderValue::from_static(resp.served_from.as_str()),
    );
    (resp.status, headers, resp.body).into_response()
}

/// Any method and any path is a fetch event.
async fn fetch_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let url = match origin_url(&state.origin, &uri) {
        Ok(url) => url,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("error: {}", e)).into_response(),
    };

    debug!("fetch event {} {}", method, url);
    let mut request = FetchRequest::new(method, url);
    request.headers = headers;

    match state.registration.fetch(request).await {
        Ok(resp) => into_http_response(resp),
        Err(e) => {
            error!("fetch {} failed: {:#}", uri, e);
            (StatusCode::BAD_GATEWAY, format!("error: {:#}", e)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    use crate::types::ServedFrom;

    #[test]
    fn test_origin_url_keeps_query() {
        let origin = Url::parse("http://app.test:8080/").unwrap();
        let uri: Uri = "/search?q=1".parse().unwrap();
        assert_eq!(
            origin_url(&origin, &uri).unwrap().as_str(),
            "http://app.test:8080/search?q=1"
        );
    }

    #[test]
    fn test_origin_url_stays_on_origin() {
        let origin = Url::parse("http://app.test:8080/").unwrap();
        let uri: Uri = "//evil.test/steal?x=1".parse().unwrap();
        let url = origin_url(&origin, &uri).unwrap();
        assert_eq!(url.host_str(), Some("app.test"));
        assert_eq!(url.port(), Some(8080));
        assert_eq!(url.path(), "//evil.test/steal");
        assert_eq!(url.query(), Some("x=1"));
    }

    #[test]
    fn test_response_drops_transfer_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        let resp = FetchResponse::new(StatusCode::OK, headers, Bytes::from_static(b"<html>"))
            .served_from(ServedFrom::Cache);

        let http = into_http_response(resp);
        assert_eq!(http.status(), StatusCode::OK);
        assert!(http.headers().get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(http.headers()[header::CONTENT_TYPE], "text/html");
        assert_eq!(http.headers()[SERVED_FROM_HEADER], "cache");
    }
}
