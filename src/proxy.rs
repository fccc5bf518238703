//! Credential-injecting proxy in front of the Expensify API.
//!
//! Clients POST `{command, params}` as JSON. The proxy checks the command against the
//! allow-list, adds the partner credentials it holds and forwards the call form-encoded.
//! The upstream status and body come back untouched.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::ProxyCommand;

pub const DEFAULT_UPSTREAM_URL: &str = "https://www.expensify.com/api";
pub const DEFAULT_PARTNER_NAME: &str = "applicant";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub upstream_url: String,
    pub partner_name: String,
    /// `None` makes every call fail with a configuration error.
    pub partner_password: Option<String>,
}

impl ProxyConfig {
    pub fn new(
        upstream_url: impl Into<String>,
        partner_name: impl Into<String>,
        partner_password: Option<String>,
    ) -> Self {
        Self {
            upstream_url: upstream_url.into(),
            partner_name: partner_name.into(),
            partner_password: partner_password.filter(|p| !p.is_empty()),
        }
    }
}

#[derive(Clone)]
pub struct ProxyState {
    config: Arc<ProxyConfig>,
    http: reqwest::Client,
}

impl ProxyState {
    pub fn new(config: ProxyConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProxyError {
    #[error("Method Not Allowed")]
    MethodNotAllowed,
    #[error("Server misconfiguration: PARTNER_PASSWORD not set")]
    MissingPartnerPassword,
    #[error("Forbidden: cross-origin requests are not allowed")]
    CrossOrigin,
    #[error("Invalid request: missing command or params")]
    InvalidRequest,
    #[error("Invalid command")]
    InvalidCommand,
    #[error("Upstream error")]
    Upstream {
        detail: String,
        status: u16,
        command: String,
    },
}

impl ProxyError {
    fn status(&self) -> StatusCode {
        match self {
            ProxyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::MissingPartnerPassword => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::CrossOrigin => StatusCode::FORBIDDEN,
            ProxyError::InvalidRequest | ProxyError::InvalidCommand => StatusCode::BAD_REQUEST,
            ProxyError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<String>,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.to_string();
        let body = match self {
            ProxyError::Upstream {
                detail,
                status,
                command,
            } => ErrorBody {
                error,
                detail: Some(detail),
                status: Some(status),
                command: Some(command),
            },
            _ => ErrorBody {
                error,
                detail: None,
                status: None,
                command: None,
            },
        };
        (status, [(header::CACHE_CONTROL, "no-store")], Json(body)).into_response()
    }
}

pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/", any(handle))
        .route("/proxy", any(handle))
        .with_state(state)
}

pub async fn run_with_listener(
    state: ProxyState,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(upstream = %state.config.upstream_url, "proxy listening on {}", addr);
    axum::serve(listener, router(state)).await
}

async fn handle(
    State(state): State<ProxyState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method == Method::OPTIONS {
        return (StatusCode::NO_CONTENT, [(header::CACHE_CONTROL, "no-store")]).into_response();
    }
    match forward(&state, &method, &headers, &body).await {
        Ok(resp) => resp,
        Err(err) => {
            tracing::warn!(
                %method,
                status = err.status().as_u16(),
                "proxy rejected request: {err}"
            );
            err.into_response()
        }
    }
}

async fn forward(
    state: &ProxyState,
    method: &Method,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, ProxyError> {
    if *method != Method::POST {
        return Err(ProxyError::MethodNotAllowed);
    }
    let password = state
        .config
        .partner_password
        .as_deref()
        .ok_or(ProxyError::MissingPartnerPassword)?;
    if !same_origin(headers) {
        return Err(ProxyError::CrossOrigin);
    }

    let (command, mut params) = parse_request(body)?;
    params.insert("partnerName".into(), Value::String(state.config.partner_name.clone()));
    params.insert("partnerPassword".into(), Value::String(password.to_string()));
    let fields = form_fields(command, &params);

    tracing::info!(%command, "forwarding to upstream");
    let upstream_error = |detail: String, status: u16| ProxyError::Upstream {
        detail,
        status,
        command: command.to_string(),
    };
    let resp = state
        .http
        .post(&state.config.upstream_url)
        .header("expensifyengineeringcandidate", "1")
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&fields)
        .send()
        .await
        .map_err(|e| upstream_error(e.to_string(), 0))?;

    let code = resp.status().as_u16();
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| upstream_error(e.to_string(), code))?;
    tracing::debug!(%command, status = code, bytes = bytes.len(), "upstream responded");

    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::OK);
    Ok((
        status,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        bytes,
    )
        .into_response())
}

fn parse_request(body: &[u8]) -> Result<(ProxyCommand, Map<String, Value>), ProxyError> {
    let input: Value = serde_json::from_slice(body).map_err(|_| ProxyError::InvalidRequest)?;
    let command = input
        .get("command")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .ok_or(ProxyError::InvalidRequest)?;
    let params = match input.get("params") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(m)) => m.clone(),
        Some(_) => return Err(ProxyError::InvalidRequest),
    };
    let command = ProxyCommand::from_str(command).map_err(|_| ProxyError::InvalidCommand)?;
    Ok((command, params))
}

/// Whether `Origin` (or, failing that, `Referer`) names the same host the request was sent
/// to. Ports and case are ignored; requests carrying neither header pass.
pub fn same_origin(headers: &HeaderMap) -> bool {
    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    };
    let Some(claimed) = header_str(header::ORIGIN).or_else(|| header_str(header::REFERER)) else {
        return true;
    };
    let Some(claimed_host) = reqwest::Url::parse(claimed)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .filter(|h| !h.is_empty())
    else {
        return true;
    };
    let host = header_str(header::HOST).unwrap_or("");
    let host = host.split(':').next().unwrap_or("");
    claimed_host.eq_ignore_ascii_case(host)
}

/// Form fields for the upstream call: `command` first, then `params` flattened.
pub fn form_fields(command: ProxyCommand, params: &Map<String, Value>) -> Vec<(String, String)> {
    let mut out = vec![("command".to_string(), command.to_string())];
    for (k, v) in params {
        flatten_into(k, v, &mut out);
    }
    out
}

fn flatten_into(key: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push((key.to_string(), if *b { "1" } else { "0" }.to_string())),
        Value::Number(n) => out.push((key.to_string(), n.to_string())),
        Value::String(s) => out.push((key.to_string(), s.clone())),
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(&format!("{key}[{i}]"), v, out);
            }
        }
        Value::Object(m) => {
            for (k, v) in m {
                flatten_into(&format!("{key}[{k}]"), v, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{HeaderValue, Request};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    fn state(password: Option<&str>) -> ProxyState {
        ProxyState::new(ProxyConfig::new(
            "http://127.0.0.1:9/api",
            DEFAULT_PARTNER_NAME,
            password.map(str::to_string),
        ))
        .unwrap()
    }

    async fn call(state: ProxyState, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let resp = router(state).oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/proxy")
            .header(header::HOST, "localhost:8080")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn headers(pairs: &[(header::HeaderName, &'static str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(k.clone(), HeaderValue::from_static(v));
        }
        h
    }

    #[test]
    fn flattens_params_like_a_php_form() {
        let params = json!({
            "authToken": "t",
            "amount": -450,
            "billable": true,
            "reimbursable": false,
            "skip": null,
            "filter": { "from": "2024-01-01", "tags": ["a", "b"] }
        });
        let fields = form_fields(ProxyCommand::CreateTransaction, params.as_object().unwrap());
        assert_eq!(fields[0], ("command".to_string(), "CreateTransaction".to_string()));
        let rest: Vec<(&str, &str)> = fields[1..]
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            rest,
            vec![
                ("amount", "-450"),
                ("authToken", "t"),
                ("billable", "1"),
                ("filter[from]", "2024-01-01"),
                ("filter[tags][0]", "a"),
                ("filter[tags][1]", "b"),
                ("reimbursable", "0"),
            ]
        );
    }

    #[test]
    fn same_origin_compares_hosts_only() {
        assert!(same_origin(&headers(&[(header::HOST, "localhost:8080")])));
        assert!(same_origin(&headers(&[
            (header::HOST, "LocalHost:8080"),
            (header::ORIGIN, "http://localhost:3000"),
        ])));
        assert!(!same_origin(&headers(&[
            (header::HOST, "localhost:8080"),
            (header::ORIGIN, "https://evil.example"),
        ])));
        assert!(!same_origin(&headers(&[
            (header::HOST, "localhost"),
            (header::REFERER, "https://evil.example/page"),
        ])));
        assert!(same_origin(&headers(&[
            (header::HOST, "app.test"),
            (header::REFERER, "https://app.test/index.html"),
        ])));
        // Origin wins over Referer.
        assert!(same_origin(&headers(&[
            (header::HOST, "app.test"),
            (header::ORIGIN, "https://app.test"),
            (header::REFERER, "https://evil.example/"),
        ])));
        assert!(same_origin(&headers(&[
            (header::HOST, "app.test"),
            (header::ORIGIN, "null"),
        ])));
    }

    #[test]
    fn parse_request_validates_shape() {
        assert_eq!(
            parse_request(br#"{"command":"Get","params":{"a":1}}"#).unwrap().0,
            ProxyCommand::Get
        );
        assert!(parse_request(br#"{"command":"Get"}"#).unwrap().1.is_empty());
        assert_eq!(parse_request(b"nope"), Err(ProxyError::InvalidRequest));
        assert_eq!(parse_request(br#"{"params":{}}"#), Err(ProxyError::InvalidRequest));
        assert_eq!(
            parse_request(br#"{"command":"Get","params":"x"}"#),
            Err(ProxyError::InvalidRequest)
        );
        assert_eq!(
            parse_request(br#"{"command":"DeleteEverything","params":{}}"#),
            Err(ProxyError::InvalidCommand)
        );
    }

    #[tokio::test]
    async fn options_is_no_content() {
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/proxy")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = call(state(Some("secret")), req).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
    }

    #[tokio::test]
    async fn only_post_is_allowed() {
        let req = Request::builder()
            .method("GET")
            .uri("/proxy")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = call(state(Some("secret")), req).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, json!({ "error": "Method Not Allowed" }));
    }

    #[tokio::test]
    async fn missing_partner_password_is_a_server_error() {
        let (status, _, body) = call(state(None), post(r#"{"command":"Get","params":{}}"#)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({ "error": "Server misconfiguration: PARTNER_PASSWORD not set" })
        );
    }

    #[tokio::test]
    async fn rejects_bad_bodies_and_commands() {
        let (status, headers, body) = call(state(Some("secret")), post("{")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
        assert_eq!(body["error"], "Invalid request: missing command or params");

        let (status, _, body) =
            call(state(Some("secret")), post(r#"{"command":"Delete","params":{}}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid command" }));
    }

    #[tokio::test]
    async fn cross_origin_is_forbidden() {
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::HOST, "localhost:8080")
            .header(header::ORIGIN, "https://elsewhere.example")
            .body(Body::from(r#"{"command":"Get","params":{}}"#))
            .unwrap();
        let (status, _, body) = call(state(Some("secret")), req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Forbidden: cross-origin requests are not allowed");
    }

    #[test]
    fn upstream_error_body_carries_context() {
        let resp = ProxyError::Upstream {
            detail: "connection refused".into(),
            status: 0,
            command: "Get".into(),
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
