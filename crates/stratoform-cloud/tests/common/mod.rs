//! In-process mock of the identity and block-storage services

#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stratoform_config::Config;
use stratoform_transport::{Pipeline, PipelineSettings, Url};

pub const PROJECT_ID: &str = "proj-1";
pub const AKSK_PROJECT_ID: &str = "proj-ak";
pub const DOMAIN_ID: &str = "dom-1";
pub const UNKNOWN_PROJECT: &str = "no-such-project";

pub struct MockCloud {
    pub base: Url,
    pub token_issues: AtomicUsize,
    pub credential_issues: AtomicUsize,
    valid_token: Mutex<Option<String>>,
    pub tag_actions: Mutex<Vec<Value>>,
    pub signed_headers: Mutex<Vec<HeaderMap>>,
}

impl MockCloud {
    /// Starts the mock on an ephemeral loopback port.
    pub async fn start() -> Arc<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mock = Arc::new(Self {
            base: Url::parse(&format!("http://{addr}/")).unwrap(),
            token_issues: AtomicUsize::new(0),
            credential_issues: AtomicUsize::new(0),
            valid_token: Mutex::new(None),
            tag_actions: Mutex::new(Vec::new()),
            signed_headers: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/v3/auth/tokens", post(issue_token))
            .route("/v3/projects", get(list_projects))
            .route("/v3/auth/catalog", get(show_catalog))
            .route("/v3.0/OS-CREDENTIAL/securitytokens", post(security_token))
            .route("/v2/{project}/volumes/{id}", get(show_volume))
            .route("/v2/{project}/cloudvolumes/{id}/tags/action", post(tag_action))
            .with_state(mock.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        mock
    }

    /// Invalidates the current token so the next request gets a 401.
    pub fn revoke(&self) {
        *self.valid_token.lock().unwrap() = None;
    }

    pub fn tokens_issued(&self) -> usize {
        self.token_issues.load(Ordering::SeqCst)
    }

    fn catalog(&self) -> Value {
        json!([{
            "type": "volumev2",
            "name": "evs",
            "endpoints": [{
                "interface": "public",
                "region": "eu-de",
                "url": format!("{}v2/$(tenant_id)s", self.base)
            }]
        }])
    }

    fn authorised(&self, headers: &HeaderMap) -> bool {
        if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok())
            && auth.starts_with("SDK-HMAC-SHA256")
        {
            self.signed_headers.lock().unwrap().push(headers.clone());
            return true;
        }
        let presented = headers.get("x-auth-token").and_then(|v| v.to_str().ok());
        let valid = self.valid_token.lock().unwrap();
        presented.is_some() && presented == valid.as_deref()
    }
}

fn unauthorised() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": {
                "code": 401,
                "message": "The request you have made requires authentication."
            }
        })),
    )
        .into_response()
}

async fn issue_token(State(mock): State<Arc<MockCloud>>, Json(body): Json<Value>) -> Response {
    let n = mock.token_issues.fetch_add(1, Ordering::SeqCst) + 1;
    let token = format!("tok-{n}");
    *mock.valid_token.lock().unwrap() = Some(token.clone());

    let domain_scoped = body["auth"]["scope"].get("domain").is_some();
    let mut token_body = json!({
        "expires_at": "2030-01-01T00:00:00Z",
        "user": { "id": "user-1", "domain": { "id": DOMAIN_ID } },
        "catalog": mock.catalog(),
    });
    if domain_scoped {
        token_body["domain"] = json!({ "id": DOMAIN_ID });
    } else {
        token_body["project"] = json!({ "id": PROJECT_ID, "domain": { "id": DOMAIN_ID } });
    }

    let mut headers = HeaderMap::new();
    headers.insert("X-Subject-Token", token.parse().unwrap());
    (StatusCode::CREATED, headers, Json(json!({ "token": token_body }))).into_response()
}

async fn list_projects(
    State(mock): State<Arc<MockCloud>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !mock.authorised(&headers) {
        return unauthorised();
    }
    // Unnamed projects come back alongside any name match.
    let mut projects = vec![json!({ "id": "proj-unnamed", "name": "" })];
    let name = query.get("name").cloned().unwrap_or_default();
    if name != UNKNOWN_PROJECT {
        projects.push(json!({ "id": AKSK_PROJECT_ID, "name": name }));
    }
    Json(json!({ "projects": projects })).into_response()
}

async fn show_catalog(State(mock): State<Arc<MockCloud>>, headers: HeaderMap) -> Response {
    if !mock.authorised(&headers) {
        return unauthorised();
    }
    Json(json!({ "catalog": mock.catalog() })).into_response()
}

async fn security_token(State(mock): State<Arc<MockCloud>>, headers: HeaderMap) -> Response {
    if !mock.authorised(&headers) {
        return unauthorised();
    }
    mock.credential_issues.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::CREATED,
        Json(json!({
            "credential": {
                "access": "TMPAK",
                "secret": "TMPSK",
                "securitytoken": "TMPSECURITYTOKEN",
                "expires_at": "2030-01-01T00:00:00Z"
            }
        })),
    )
        .into_response()
}

async fn show_volume(
    State(mock): State<Arc<MockCloud>>,
    headers: HeaderMap,
    Path((_project, id)): Path<(String, String)>,
) -> Response {
    if !mock.authorised(&headers) {
        return unauthorised();
    }
    if id == "vol-1" {
        let volume = json!({ "volume": { "id": "vol-1", "status": "available", "size": 10 } });
        Json(volume).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({
                "itemNotFound": { "code": 404, "message": "Volume could not be found." }
            })),
        )
            .into_response()
    }
}

async fn tag_action(
    State(mock): State<Arc<MockCloud>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !mock.authorised(&headers) {
        return unauthorised();
    }
    mock.tag_actions.lock().unwrap().push(body);
    StatusCode::NO_CONTENT.into_response()
}

pub fn password_config(mock: &MockCloud) -> Arc<Config> {
    Arc::new(Config {
        identity_endpoint: format!("{}v3", mock.base),
        username: "demouser".to_string(),
        password: "qwerty!1234".to_string(),
        domain_name: "OTC-DOMAIN".to_string(),
        tenant_name: "eu-de".to_string(),
        region: "eu-de".to_string(),
        ..Default::default()
    })
}

pub fn aksk_config(mock: &MockCloud) -> Arc<Config> {
    Arc::new(Config {
        identity_endpoint: format!("{}v3", mock.base),
        access_key: "AKTESTVALUE".to_string(),
        secret_key: "SKTESTVALUE".to_string(),
        region: "eu-de".to_string(),
        ..Default::default()
    })
}

pub fn pipeline() -> Pipeline {
    Pipeline::new(PipelineSettings::default()).unwrap()
}
