use std::fmt;
use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::{Value, json};

use crate::config::load_token;
use crate::normalize::{RawRecord, extract_transaction_list};
use crate::types::ProxyCommand;

const RAW_BODY_DISPLAY_LIMIT: usize = 400;

#[derive(Debug, Clone)]
pub enum ClientMode {
    Http {
        proxy_url: String,
        token: Option<String>,
        token_file: PathBuf,
    },
    Fixtures(PathBuf),
}

/// Failure of a proxied call. `status` is the HTTP status (or the API's `jsonCode`),
/// `0` when no response arrived at all.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub payload: Option<Value>,
    pub raw: Option<String>,
}

impl ApiError {
    fn network(err: impl std::fmt::Display) -> Self {
        Self {
            status: 0,
            payload: None,
            raw: Some(err.to_string()),
        }
    }

    /// Message for display: the payload's own `error`/`message` when present, otherwise
    /// `fallback` decorated with the status and a short raw body.
    pub fn user_message(&self, fallback: &str) -> String {
        if let Some(m) = self.payload.as_ref().and_then(payload_message) {
            return m;
        }
        let mut msg = fallback.to_string();
        if self.status != 0 {
            msg.push_str(&format!(" (HTTP {})", self.status));
        }
        if let Some(raw) = self.raw.as_deref().filter(|r| !r.is_empty())
            && raw.len() < RAW_BODY_DISPLAY_LIMIT
        {
            msg.push_str(&format!(" :: {raw}"));
        }
        msg
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message("request failed"))
    }
}

impl std::error::Error for ApiError {}

fn payload_message(payload: &Value) -> Option<String> {
    ["error", "message"]
        .iter()
        .filter_map(|k| payload.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// A manually entered transaction, amounts already signed and in cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTransaction {
    pub created: String,
    pub merchant: String,
    pub amount: i64,
    pub currency: String,
    pub comment: String,
}

impl NewTransaction {
    /// The record inserted locally once the create call succeeds.
    pub fn to_record(&self) -> RawRecord {
        let mut m = RawRecord::new();
        m.insert("created".into(), json!(self.created));
        m.insert("merchant".into(), json!(self.merchant));
        m.insert("amount".into(), json!(self.amount));
        m.insert("currency".into(), json!(self.currency));
        m.insert("comment".into(), json!(self.comment));
        m
    }
}

#[derive(Debug, Clone)]
pub struct ExpensifyClient {
    mode: ClientMode,
}

impl ExpensifyClient {
    pub fn new(mode: ClientMode) -> Self {
        Self { mode }
    }

    /// Exchanges user credentials for an auth token.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<String, ApiError> {
        let body = self.request(
            ProxyCommand::Authenticate,
            json!({
                "partnerUserID": email,
                "partnerUserSecret": password,
            }),
        )?;
        match body.get("authToken").and_then(Value::as_str) {
            Some(t) if !t.is_empty() => Ok(t.to_string()),
            _ => Err(ApiError {
                status: 200,
                payload: Some(json!({
                    "error": payload_message(&body)
                        .unwrap_or_else(|| "Authentication failed.".to_string())
                })),
                raw: None,
            }),
        }
    }

    pub fn get_transactions(&self) -> Result<Vec<RawRecord>, ApiError> {
        let body = self.request(
            ProxyCommand::Get,
            json!({
                "authToken": self.token(),
                "returnValueList": "transactionList",
            }),
        )?;
        Ok(extract_transaction_list(&body)
            .into_iter()
            .map(|v| match v {
                Value::Object(m) => m,
                _ => RawRecord::new(),
            })
            .collect())
    }

    /// Creates `txn` upstream and returns the record to insert locally.
    pub fn create_transaction(&self, txn: &NewTransaction) -> Result<RawRecord, ApiError> {
        let mut params = json!({ "authToken": self.token() });
        if let (Some(obj), Value::Object(fields)) = (
            params.as_object_mut(),
            serde_json::to_value(txn).map_err(ApiError::network)?,
        ) {
            obj.extend(fields);
        }
        self.request(ProxyCommand::CreateTransaction, params)?;
        Ok(txn.to_record())
    }

    fn token(&self) -> Option<String> {
        match &self.mode {
            ClientMode::Http {
                token, token_file, ..
            } => token.clone().or_else(|| load_token(token_file).ok()),
            ClientMode::Fixtures(_) => Some("fixture-token".to_string()),
        }
    }

    fn request(&self, command: ProxyCommand, params: Value) -> Result<Value, ApiError> {
        match &self.mode {
            ClientMode::Fixtures(dir) => {
                let path = dir.join(format!("{command}.json"));
                let s = fs::read_to_string(&path).map_err(ApiError::network)?;
                let body: Value = serde_json::from_str(&s).map_err(ApiError::network)?;
                check_json_code(200, body)
            }
            ClientMode::Http { proxy_url, .. } => {
                tracing::debug!(%command, url = %proxy_url, "proxy request");
                let http = reqwest::blocking::Client::new();
                let resp = http
                    .post(proxy_url)
                    .json(&json!({ "command": command.as_str(), "params": params }))
                    .send()
                    .map_err(ApiError::network)?;

                let status = resp.status();
                let text = resp.text().map_err(ApiError::network)?;
                let parsed = serde_json::from_str::<Value>(&text).ok();

                if !status.is_success() {
                    tracing::warn!(%command, status = status.as_u16(), "proxy request failed");
                    return Err(ApiError {
                        status: status.as_u16(),
                        payload: parsed,
                        raw: Some(text),
                    });
                }
                let Some(body) = parsed else {
                    return Err(ApiError {
                        status: status.as_u16(),
                        payload: None,
                        raw: Some(text),
                    });
                };
                check_json_code(status.as_u16(), body)
            }
        }
    }
}

/// The API reports failures inside 2xx bodies as a non-200 `jsonCode`.
fn check_json_code(status: u16, body: Value) -> Result<Value, ApiError> {
    match body.get("jsonCode").and_then(Value::as_u64) {
        Some(code) if code != 200 => Err(ApiError {
            status: u16::try_from(code).unwrap_or(status),
            payload: Some(body),
            raw: None,
        }),
        _ => Ok(body),
    }
}
