//! Client address resolution.
//!
//! Stores the resolved `ClientAddress` in the request extensions so handlers
//! and later middleware see the real client instead of the last proxy.

use crate::errors::RecordingError;
use crate::net::{forwarded_for, resolve_client_address, ClientAddress, TrustedNetworkSet};
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Resolve the client address of a request.
///
/// Requires the server to be started with connect info
/// (`into_make_service_with_connect_info::<SocketAddr>()`).
///
/// # Errors
///
/// `RecordingError::Internal` if the peer address is unavailable or the
/// resolution fails.
#[instrument(skip_all, name = "recording.middleware.client_address")]
pub async fn resolve_client(
    State(trusted_proxies): State<Arc<TrustedNetworkSet>>,
    mut req: Request,
    next: Next,
) -> Result<Response, RecordingError> {
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .ok_or_else(|| RecordingError::Internal("peer address unavailable".to_string()))?;

    let chain = forwarded_for(req.headers());

    let client = resolve_client_address(&remote, chain.as_deref(), &trusted_proxies)
        .map_err(|e| RecordingError::Internal(format!("client address resolution failed: {}", e)))?;

    debug!(
        target: "recording.net",
        remote = %remote,
        client = %client,
        "Resolved client address"
    );

    req.extensions_mut().insert(ClientAddress(client));

    Ok(next.run(req).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Extension, Router,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn echo_client(Extension(client): Extension<ClientAddress>) -> String {
        client.0
    }

    fn app(trusted: &[&str]) -> Router {
        let trusted = Arc::new(TrustedNetworkSet::parse(trusted.iter()));
        Router::new()
            .route("/", get(echo_client))
            .layer(middleware::from_fn_with_state(trusted, resolve_client))
    }

    async fn client_of(app: Router, forwarded: Option<&str>) -> (StatusCode, String) {
        let mut builder = HttpRequest::builder().uri("/");
        if let Some(forwarded) = forwarded {
            builder = builder.header("X-Forwarded-For", forwarded);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_untrusted_peer_is_the_client() {
        let app = app(&["192.168.0.0/16"]).layer(Extension(ConnectInfo(SocketAddr::from((
            [10, 0, 0, 1],
            4321,
        )))));

        let (status, client) = client_of(app, Some("1.2.3.4")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(client, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_trusted_proxy_chain_is_followed() {
        let app = app(&["192.168.0.0/16"]).layer(Extension(ConnectInfo(SocketAddr::from((
            [192, 168, 0, 1],
            4321,
        )))));

        let (status, client) = client_of(app, Some("1.2.3.4, 192.168.1.1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(client, "1.2.3.4");
    }

    #[tokio::test]
    async fn test_missing_connect_info_is_internal_error() {
        let (status, _) = client_of(app(&[]), None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
