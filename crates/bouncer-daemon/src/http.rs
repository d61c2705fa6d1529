//! HTTP surface: the revoke endpoint and a health probe.
//!
//! `GET /revoke/{identity_id}` removes the identity from every monitored
//! group and answers with JSON:
//! - `400` when the identity is not an integer
//! - `200` when every removal succeeded
//! - `502` when at least one removal failed, listing the failed groups

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use bouncer_core::RevocationHandler;
use bouncer_types::IdentityId;

/// Build the router for the daemon's HTTP listener.
pub fn router(revocation: Arc<RevocationHandler>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/revoke/:identity_id", get(revoke))
        .with_state(revocation)
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn revoke(
    State(handler): State<Arc<RevocationHandler>>,
    Path(raw): Path<String>,
) -> (StatusCode, Json<Value>) {
    let identity: IdentityId = match raw.parse() {
        Ok(identity) => identity,
        Err(e) => {
            tracing::debug!(identity_id = %raw, "rejected revoke request");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": e.to_string() })),
            );
        }
    };

    tracing::info!(identity_id = %identity, groups = handler.groups().len(), "revoke requested");
    match handler.revoke(identity).await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "identity_id": report.identity_id,
                "removed": report.removed,
            })),
        ),
        Err(failure) => {
            let error = failure.to_string();
            let report = failure.report;
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "success": false,
                    "identity_id": report.identity_id,
                    "removed": report.removed,
                    "failed": report.failed,
                    "error": error,
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bouncer_types::errors::BouncerError;
    use bouncer_types::traits::PlatformClient;
    use bouncer_types::{GroupId, MessageTarget, UpdateEvent};
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Platform whose removals fail for the groups listed in `failing`.
    #[derive(Default)]
    struct MockPlatform {
        failing: Vec<GroupId>,
        removals: Mutex<Vec<(GroupId, IdentityId)>>,
    }

    #[async_trait]
    impl PlatformClient for MockPlatform {
        async fn fetch_updates(
            &self,
            _offset: i64,
            _timeout: Duration,
        ) -> Result<Vec<UpdateEvent>, BouncerError> {
            Ok(Vec::new())
        }

        async fn approve_join_request(
            &self,
            _group: &GroupId,
            _identity: IdentityId,
        ) -> Result<(), BouncerError> {
            Ok(())
        }

        async fn remove_member(
            &self,
            group: &GroupId,
            identity: IdentityId,
        ) -> Result<(), BouncerError> {
            self.removals.lock().unwrap().push((group.clone(), identity));
            if self.failing.contains(group) {
                return Err(BouncerError::Api {
                    method: "unbanChatMember".to_string(),
                    code: Some(400),
                    description: "Bad Request: chat not found".to_string(),
                });
            }
            Ok(())
        }

        async fn send_message(
            &self,
            _target: &MessageTarget,
            _text: &str,
        ) -> Result<(), BouncerError> {
            Ok(())
        }
    }

    /// Start a test server and return its base URL.
    async fn start_test_server(platform: Arc<MockPlatform>) -> String {
        let groups = vec![GroupId::from("-1001"), GroupId::from("-1002")];
        let app = router(Arc::new(RevocationHandler::new(platform, groups)));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn get_json(url: &str) -> (u16, Value) {
        let response = reqwest::get(url).await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let base = start_test_server(Arc::new(MockPlatform::default())).await;
        let (status, body) = get_json(&format!("{base}/health")).await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_revoke_success() {
        let platform = Arc::new(MockPlatform::default());
        let base = start_test_server(platform.clone()).await;

        let (status, body) = get_json(&format!("{base}/revoke/42")).await;

        assert_eq!(status, 200);
        assert_eq!(
            body,
            json!({ "success": true, "identity_id": 42, "removed": ["-1001", "-1002"] })
        );
        assert_eq!(platform.removals.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_revoke_partial_failure() {
        let platform = Arc::new(MockPlatform {
            failing: vec![GroupId::from("-1002")],
            ..Default::default()
        });
        let base = start_test_server(platform).await;

        let (status, body) = get_json(&format!("{base}/revoke/2")).await;

        assert_eq!(status, 502);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["identity_id"], json!(2));
        assert_eq!(body["removed"], json!(["-1001"]));
        assert_eq!(body["failed"][0]["group_id"], json!("-1002"));
        assert!(body["failed"][0]["error"]
            .as_str()
            .unwrap()
            .contains("chat not found"));
    }

    #[tokio::test]
    async fn test_revoke_rejects_non_numeric_identity() {
        let platform = Arc::new(MockPlatform::default());
        let base = start_test_server(platform.clone()).await;

        let (status, body) = get_json(&format!("{base}/revoke/alice")).await;

        assert_eq!(status, 400);
        assert_eq!(body["success"], json!(false));
        assert!(body["error"].is_string());
        assert!(platform.removals.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let platform = Arc::new(MockPlatform::default());
        let app = router(Arc::new(RevocationHandler::new(platform, Vec::new())));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            serve(listener, app, async {}),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
    }
}
