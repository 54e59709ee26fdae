mod common;

use axum::Json;
use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use common::{LogCapture, closed_port, fast_retry, pipeline, spawn};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stratoform_transport::{
    CancelSource, CancelToken, HttpRequest, Method, Pipeline, PipelineSettings, RetryPolicy,
    Signer, TransportError,
};

fn counting_route(path: &str, hits: Arc<AtomicU32>, respond: fn(u32) -> Response) -> Router {
    Router::new().route(
        path,
        get(move || {
            let hits = hits.clone();
            async move { respond(hits.fetch_add(1, Ordering::SeqCst) + 1) }
        }),
    )
}

#[tokio::test]
async fn test_retryable_budget_then_success() {
    let hits = Arc::new(AtomicU32::new(0));
    let app = counting_route("/volumes", hits.clone(), |n| {
        if n <= 2 {
            (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response()
        } else {
            Json(json!({ "volumes": [] })).into_response()
        }
    });
    let base = spawn(app).await;

    let response = pipeline(3)
        .execute(
            HttpRequest::get(base.join("volumes").unwrap()),
            None,
            &CancelToken::never(),
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.attempts, 3);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_budget_exhausted() {
    let hits = Arc::new(AtomicU32::new(0));
    let app = counting_route("/busy", hits.clone(), |_| {
        (StatusCode::GATEWAY_TIMEOUT, "slow").into_response()
    });
    let base = spawn(app).await;

    let err = pipeline(2)
        .execute(
            HttpRequest::get(base.join("busy").unwrap()),
            None,
            &CancelToken::never(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "transport-retryable");
    assert_eq!(err.status(), Some(504));
    assert!(matches!(err, TransportError::Exhausted { attempts: 3, .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let hits = Arc::new(AtomicU32::new(0));
    let app = counting_route("/volumes/v", hits.clone(), |_| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({
                "itemNotFound": { "code": 404, "message": "Volume v could not be found." }
            })),
        )
            .into_response()
    });
    let base = spawn(app).await;

    let err = pipeline(5)
        .execute(
            HttpRequest::get(base.join("volumes/v").unwrap()),
            None,
            &CancelToken::never(),
        )
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.code(), "not-found");
    assert!(err.to_string().contains("Volume v could not be found."));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_throttled_body_code_is_retried() {
    let hits = Arc::new(AtomicU32::new(0));
    let app = counting_route("/zones", hits.clone(), |n| {
        if n == 1 {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error_code": "APIGW.0308", "error_msg": "throttled" })),
            )
                .into_response()
        } else {
            Json(json!({ "zones": [] })).into_response()
        }
    });
    let base = spawn(app).await;

    let response = pipeline(1)
        .execute(
            HttpRequest::get(base.join("zones").unwrap()),
            None,
            &CancelToken::never(),
        )
        .await
        .unwrap();
    assert_eq!(response.attempts, 2);
}

#[tokio::test]
async fn test_plain_client_error_is_fatal() {
    let hits = Arc::new(AtomicU32::new(0));
    let app = counting_route("/servers", hits.clone(), |_| {
        (
            StatusCode::CONFLICT,
            Json(json!({ "error": { "code": "Ecs.0114", "message": "name in use" } })),
        )
            .into_response()
    });
    let base = spawn(app).await;

    let err = pipeline(3)
        .execute(
            HttpRequest::get(base.join("servers").unwrap()),
            None,
            &CancelToken::never(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "transport-fatal");
    assert_eq!(err.service_code(), Some("Ecs.0114"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_network_failure_is_retryable() {
    let base = closed_port().await;
    let err = pipeline(1)
        .execute(
            HttpRequest::get(base.join("anything").unwrap()),
            None,
            &CancelToken::never(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "transport-retryable");
    assert!(matches!(err, TransportError::Exhausted { attempts: 2, .. }));
}

#[tokio::test]
async fn test_redirect_is_resigned() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let start_seen = seen.clone();
    let final_seen = seen.clone();
    let app = Router::new()
        .route(
            "/start",
            get(move |headers: HeaderMap| {
                let seen = start_seen.clone();
                async move {
                    seen.lock().unwrap().push(authorization(&headers));
                    (StatusCode::TEMPORARY_REDIRECT, [("location", "/final?x=1")]).into_response()
                }
            }),
        )
        .route(
            "/final",
            get(move |headers: HeaderMap| {
                let seen = final_seen.clone();
                async move {
                    seen.lock().unwrap().push(authorization(&headers));
                    Json(json!({ "ok": true })).into_response()
                }
            }),
        );
    let base = spawn(app).await;
    let signer = Signer::new("AKEXAMPLE", "SKEXAMPLE", None);

    let response = pipeline(0)
        .execute(
            HttpRequest::get(base.join("start").unwrap()),
            Some(&signer),
            &CancelToken::never(),
        )
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.url.path(), "/final");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    for auth in seen.iter() {
        assert!(auth.starts_with("SDK-HMAC-SHA256 Access=AKEXAMPLE"), "{auth}");
    }
    assert_ne!(seen[0], seen[1]);
}

fn authorization(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_unsigned_redirect_followed() {
    let app = Router::new()
        .route(
            "/old",
            get(|| async { (StatusCode::MOVED_PERMANENTLY, [("location", "/new")]) }),
        )
        .route("/new", get(|| async { "moved" }));
    let base = spawn(app).await;

    let response = pipeline(0)
        .execute(
            HttpRequest::get(base.join("old").unwrap()),
            None,
            &CancelToken::never(),
        )
        .await
        .unwrap();
    assert_eq!(response.text(), "moved");
}

#[tokio::test]
async fn test_unsigned_redirect_drops_credentials_across_origins() {
    let seen = Arc::new(Mutex::new(Vec::<HeaderMap>::new()));
    let final_seen = seen.clone();
    let other = spawn(Router::new().route(
        "/landing",
        get(move |headers: HeaderMap| {
            let seen = final_seen.clone();
            async move {
                seen.lock().unwrap().push(headers);
                "landed"
            }
        }),
    ))
    .await;
    let target = other.join("landing").unwrap().to_string();
    let base = spawn(Router::new().route(
        "/start",
        get(move || {
            let target = target.clone();
            async move { (StatusCode::FOUND, [("location", target)]).into_response() }
        }),
    ))
    .await;

    let request = HttpRequest::get(base.join("start").unwrap())
        .header("Authorization", "Bearer secret")
        .unwrap()
        .header("X-Auth-Token", "gAAAAtoken")
        .unwrap()
        .header("X-Security-Token", "session")
        .unwrap()
        .header("X-Trace", "kept")
        .unwrap();
    let response = pipeline(0)
        .execute(request, None, &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(response.text(), "landed");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    for name in ["authorization", "x-auth-token", "x-security-token"] {
        assert!(seen[0].get(name).is_none(), "{name} leaked");
    }
    assert_eq!(seen[0]["x-trace"], "kept");
}

#[tokio::test]
async fn test_cancel_in_flight_request() {
    let app = Router::new().route(
        "/slow",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            "late"
        }),
    );
    let base = spawn(app).await;
    let source = CancelSource::new();
    let token = source.token();
    let pipeline = pipeline(0);
    let url = base.join("slow").unwrap();

    let task =
        tokio::spawn(async move { pipeline.execute(HttpRequest::get(url), None, &token).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    source.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(TransportError::Cancelled)));
}

#[tokio::test]
async fn test_cancel_between_retries() {
    let hits = Arc::new(AtomicU32::new(0));
    let app = counting_route("/busy", hits.clone(), |_| {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    });
    let base = spawn(app).await;
    let pipeline = Pipeline::new(PipelineSettings {
        retry: RetryPolicy {
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(60),
            ..fast_retry(3)
        },
        ..Default::default()
    })
    .unwrap();
    let source = CancelSource::new();
    let token = source.token();
    let url = base.join("busy").unwrap();

    let task =
        tokio::spawn(async move { pipeline.execute(HttpRequest::get(url), None, &token).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    source.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(TransportError::Cancelled)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_logs_never_contain_secrets() {
    let capture = LogCapture::default();
    let _guard = capture.install();

    let app = Router::new().route(
        "/v3/auth/tokens",
        post(|| async {
            (
                StatusCode::CREATED,
                [("x-subject-token", "subject-token-value")],
                Json(json!({
                    "credential": {
                        "access": "AKTEMP",
                        "secret": "SKTEMP",
                        "securitytoken": "STTEMP"
                    }
                })),
            )
        }),
    );
    let base = spawn(app).await;
    let pipeline = Pipeline::new(PipelineSettings {
        debug: true,
        secrets: vec!["qwerty!1234".to_string(), "gAAAAsecret".to_string()],
        ..Default::default()
    })
    .unwrap();

    let request = HttpRequest::new(Method::POST, base.join("v3/auth/tokens").unwrap())
        .header("X-Auth-Token", "gAAAAsecret")
        .unwrap()
        .json(&json!({
            "auth": { "identity": { "methods": ["password"], "password": {
                "user": { "name": "demouser", "password": "qwerty!1234" }
            }}}
        }))
        .unwrap();
    pipeline
        .execute(request, None, &CancelToken::never())
        .await
        .unwrap();

    let logs = capture.contents();
    assert!(logs.contains("HTTP request"));
    assert!(logs.contains("HTTP response"));
    assert!(logs.contains("***"));
    for secret in [
        "qwerty!1234",
        "gAAAAsecret",
        "subject-token-value",
        "AKTEMP",
        "SKTEMP",
        "STTEMP",
    ] {
        assert!(!logs.contains(secret), "{secret} leaked into logs");
    }
}

#[tokio::test]
async fn test_error_text_is_scrubbed() {
    let app = Router::new().route(
        "/servers",
        get(|| async {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": { "message": "token gAAAAsecret has expired" } })),
            )
        }),
    );
    let base = spawn(app).await;
    let pipeline = Pipeline::new(PipelineSettings {
        secrets: vec!["gAAAAsecret".to_string()],
        ..Default::default()
    })
    .unwrap();

    let err = pipeline
        .execute(
            HttpRequest::get(base.join("servers").unwrap()),
            None,
            &CancelToken::never(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(!err.to_string().contains("gAAAAsecret"));
}

#[tokio::test]
async fn test_user_agent_attached() {
    let app = Router::new().route(
        "/ua",
        get(|headers: HeaderMap| async move {
            headers
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        }),
    );
    let base = spawn(app).await;
    let response = pipeline(0)
        .execute(
            HttpRequest::get(base.join("ua").unwrap()),
            None,
            &CancelToken::never(),
        )
        .await
        .unwrap();
    assert!(response.text().starts_with("stratoform/"));
}
