use crate::auth::{AuthError, Authenticator, require_auth};
use crate::cancel::{CancelError, CancelPolicy, CancellationResult, Canceller};
use crate::discovery::{RunningBuild, scan_running_builds};
use crate::identity::AuthenticatedUser;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Extension, Json, Router, middleware};
use chrono::{SecondsFormat, Utc};
use jenkins::CiServer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path as FsPath;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub ci: Arc<dyn CiServer>,
    pub canceller: Arc<Canceller>,
}

pub fn router(state: AppState, authenticator: Authenticator, static_dir: Option<&FsPath>) -> Router {
    let protected = Router::new()
        .route("/api/user/builds", get(user_builds))
        .route("/api/user/info", get(user_info))
        .route("/api/builds/{job}/{build_number}/cancel", post(cancel_build))
        .route_layer(middleware::from_fn_with_state(authenticator, require_auth));

    let mut app = Router::new()
        .route("/api/health", get(health))
        .route("/api/{*path}", any(api_not_found))
        .merge(protected)
        .with_state(state);

    if let Some(dir) = static_dir {
        let index = ServeFile::new(dir.join("index.html"));
        app = app.fallback_service(ServeDir::new(dir).fallback(index));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = Json(ErrorBody {
        error: message.into(),
    });
    (status, body).into_response()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingToken => "No authorization token provided",
            _ => "Invalid token",
        };
        error_response(StatusCode::UNAUTHORIZED, message)
    }
}

impl IntoResponse for CancelError {
    fn into_response(self) -> Response {
        let status = match self {
            CancelError::MissingReason | CancelError::NotRunning => StatusCode::BAD_REQUEST,
            CancelError::NotFound => StatusCode::NOT_FOUND,
            CancelError::NotOwner { .. } => StatusCode::FORBIDDEN,
            CancelError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            CancelError::StopFailed(_) | CancelError::Lookup(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        error_response(status, self.to_string())
    }
}

async fn api_not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    jenkins: String,
    timestamp: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let jenkins = match state.ci.whoami().await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Jenkins health probe failed");
            "disconnected"
        }
    };

    Json(HealthResponse {
        status: "healthy".into(),
        jenkins: jenkins.into(),
        timestamp: timestamp(),
    })
}

#[derive(Serialize)]
struct UserBuildsResponse {
    builds: Vec<RunningBuild>,
    count: usize,
    username: String,
    message: &'static str,
}

async fn user_builds(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Json<UserBuildsResponse> {
    let builds = scan_running_builds(state.ci.as_ref()).await;
    let message = match state.canceller.policy() {
        CancelPolicy::AnyUser => "Showing all running builds (any user can cancel any build)",
        CancelPolicy::OwnerOnly => "Showing all running builds (only the user that started a build can cancel it)",
    };

    Json(UserBuildsResponse {
        count: builds.len(),
        builds,
        username: user.display_name(),
        message,
    })
}

#[derive(Serialize)]
struct UserInfoResponse {
    user: Map<String, Value>,
    username: String,
    available_fields: Vec<String>,
}

async fn user_info(Extension(user): Extension<AuthenticatedUser>) -> Json<UserInfoResponse> {
    Json(UserInfoResponse {
        username: user.display_name(),
        available_fields: user.claims().keys().cloned().collect(),
        user: user.claims().clone(),
    })
}

#[derive(Default, Deserialize)]
struct CancelRequest {
    #[serde(default)]
    reason: Option<String>,
}

async fn cancel_build(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((job, build_number)): Path<(String, String)>,
    payload: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Json<CancellationResult>, Response> {
    let build_number: u64 = build_number
        .parse()
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid build number"))?;
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Unreadable cancellation body");
            CancelRequest::default()
        }
    };

    state
        .canceller
        .cancel(&job, build_number, &user, request.reason.as_deref())
        .await
        .map(Json)
        .map_err(IntoResponse::into_response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_tokens::{claims, sign, test_verifier};
    use crate::testutils::{FakeCiServer, RecordingNotifier, running_build, started_by};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use serde_json::json;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        ci: Arc<FakeCiServer>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(ci: FakeCiServer, policy: CancelPolicy) -> Harness {
        let ci = Arc::new(ci);
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState {
            ci: ci.clone(),
            canceller: Arc::new(Canceller::new(ci.clone(), notifier.clone(), policy)),
        };
        let authenticator = Authenticator::Enforce(Arc::new(test_verifier()));
        Harness {
            app: router(state, authenticator, None),
            ci,
            notifier,
        }
    }

    fn default_server() -> FakeCiServer {
        FakeCiServer::new()
            .with_job("A", "blue", None)
            .with_job("B", "blue_anime", Some((7, running_build(started_by("alice")))))
    }

    fn bearer(username: &str) -> String {
        let token = sign(&claims(json!({"token_use": "access", "username": username})));
        format!("Bearer {token}")
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn cancel_request(uri: &str, user: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::AUTHORIZATION, bearer(user))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(default_server(), CancelPolicy::AnyUser);
        let (status, body) = send(&h.app, Request::get("/api/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["jenkins"], "connected");
        assert!(body["timestamp"].is_string());

        let mut offline = default_server();
        offline.offline = true;
        let h = harness(offline, CancelPolicy::AnyUser);
        let (status, body) = send(&h.app, Request::get("/api/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["jenkins"], "disconnected");
    }

    #[tokio::test]
    async fn test_user_builds() {
        let h = harness(default_server(), CancelPolicy::AnyUser);
        let request = Request::get("/api/user/builds")
            .header(header::AUTHORIZATION, bearer("bob"))
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["username"], "bob");
        assert_eq!(body["builds"][0]["job_name"], "B");
        assert_eq!(body["builds"][0]["build_number"], 7);
        assert_eq!(body["builds"][0]["started_by"], "alice");
        assert_eq!(body["builds"][0]["node"], "built-in");
        assert!(body["message"].as_str().unwrap().contains("any user"));
    }

    #[tokio::test]
    async fn test_requires_token() {
        let h = harness(default_server(), CancelPolicy::AnyUser);

        let (status, body) =
            send(&h.app, Request::get("/api/user/builds").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "No authorization token provided");

        let request = Request::get("/api/user/info")
            .header(header::AUTHORIZATION, "Bearer not.a.jwt")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid token");

        assert!(h.ci.calls().is_empty());
    }

    #[tokio::test]
    async fn test_user_info() {
        let h = harness(default_server(), CancelPolicy::AnyUser);
        let request = Request::get("/api/user/info")
            .header(header::AUTHORIZATION, bearer("carol"))
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "carol");
        assert_eq!(body["user"]["username"], "carol");
        let fields = body["available_fields"].as_array().unwrap();
        assert!(fields.contains(&json!("sub")));
        assert!(fields.contains(&json!("token_use")));
    }

    #[tokio::test]
    async fn test_cancel() {
        let h = harness(default_server(), CancelPolicy::AnyUser);
        let request = cancel_request("/api/builds/B/7/cancel", "bob", r#"{"reason": "flaky test"}"#);

        let (status, body) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Build B#7 has been cancelled");
        assert_eq!(body["cancelled_by"], "bob");
        assert_eq!(body["reason"], "flaky test");
        assert_eq!(h.ci.stop_calls(), 1);
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_errors() {
        let mut finished = running_build(vec![]);
        finished.building = false;
        let ci = default_server().with_job("done", "blue", Some((3, finished)));
        let h = harness(ci, CancelPolicy::OwnerOnly);

        let cases = [
            ("/api/builds/B/7/cancel", "alice", r#"{"reason": "  "}"#, StatusCode::BAD_REQUEST, "Cancellation reason is required"),
            ("/api/builds/B/7/cancel", "alice", "not json", StatusCode::BAD_REQUEST, "Cancellation reason is required"),
            ("/api/builds/B/7/cancel", "alice", r#"{"reason": 5}"#, StatusCode::BAD_REQUEST, "Cancellation reason is required"),
            ("/api/builds/B/seven/cancel", "alice", r#"{"reason": "x"}"#, StatusCode::BAD_REQUEST, "Invalid build number"),
            ("/api/builds/B/8/cancel", "alice", r#"{"reason": "x"}"#, StatusCode::NOT_FOUND, "Build not found"),
            ("/api/builds/done/3/cancel", "alice", r#"{"reason": "x"}"#, StatusCode::BAD_REQUEST, "Build is not currently running"),
        ];
        for (uri, user, body, expected_status, expected_error) in cases {
            let (status, response) = send(&h.app, cancel_request(uri, user, body)).await;
            assert_eq!(status, expected_status, "{uri} {body}");
            assert_eq!(response["error"], expected_error, "{uri} {body}");
        }

        let (status, _) = send(
            &h.app,
            cancel_request("/api/builds/B/7/cancel", "bob", r#"{"reason": "x"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(h.ci.stop_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_upstream_unavailable() {
        let mut ci = default_server();
        ci.offline = true;
        let h = harness(ci, CancelPolicy::AnyUser);

        let (status, body) = send(
            &h.app,
            cancel_request("/api/builds/B/7/cancel", "alice", r#"{"reason": "x"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Jenkins connection failed");
    }

    #[tokio::test]
    async fn test_cancel_lookup_rejected_by_jenkins() {
        let mut ci = default_server();
        ci.build_status = Some(StatusCode::FORBIDDEN);
        let h = harness(ci, CancelPolicy::AnyUser);

        let (status, body) = send(
            &h.app,
            cancel_request("/api/builds/B/7/cancel", "alice", r#"{"reason": "x"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(h.ci.stop_calls(), 0);
    }

    #[tokio::test]
    async fn test_folder_job_name_is_decoded() {
        let ci = FakeCiServer::new()
            .with_job("team/app", "blue_anime", Some((2, running_build(vec![]))));
        let h = harness(ci, CancelPolicy::AnyUser);

        let (status, body) = send(
            &h.app,
            cancel_request("/api/builds/team%2Fapp/2/cancel", "alice", r#"{"reason": "x"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["job_name"], "team/app");
    }

    #[tokio::test]
    async fn test_static_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>buildstop</html>").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();

        let ci = Arc::new(default_server());
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState {
            ci: ci.clone(),
            canceller: Arc::new(Canceller::new(ci, notifier, CancelPolicy::AnyUser)),
        };
        let app = router(
            state,
            Authenticator::Enforce(Arc::new(test_verifier())),
            Some(dir.path()),
        );

        for (uri, expected) in [("/app.js", "console.log(1)"), ("/builds/B", "<html>buildstop</html>")] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(bytes, expected.as_bytes());
        }

        for uri in ["/api/nope", "/api/user/builds/extra"] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["error"], "Not found");
        }
    }
}
