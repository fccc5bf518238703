use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::format::{format_amount_cents, format_date};

/// A transaction exactly as the upstream API returned it.
pub type RawRecord = Map<String, Value>;

pub const DEFAULT_CURRENCY: &str = "USD";

const DATE_FIELDS: &[&str] = &[
    "created",
    "createdAt",
    "date",
    "posted",
    "transactionDate",
    "inserted",
];
const MERCHANT_FIELDS: &[&str] = &["merchant", "merchantName", "payee", "vendor"];
const CURRENCY_FIELDS: &[&str] = &["currency", "currencyCode"];
const COMMENT_FIELDS: &[&str] = &["comment", "note", "description"];

/// Stable per-session identity of a normalized transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TxId(u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// Canonical transaction. Only [`Normalizer`] builds these, and nothing mutates them
/// afterwards, so the cached lowercase and display fields always match their sources.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    id: TxId,
    date: String,
    merchant: String,
    amount_cents: Option<i64>,
    currency: String,
    comment: String,
    #[serde(skip)]
    merchant_lc: String,
    #[serde(skip)]
    comment_lc: String,
    amount_formatted: String,
    date_formatted: String,
    #[serde(skip)]
    raw: RawRecord,
}

impl Transaction {
    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn merchant(&self) -> &str {
        &self.merchant
    }

    /// Signed minor units; `None` when the record carried no recognizable amount.
    pub fn amount_cents(&self) -> Option<i64> {
        self.amount_cents
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn merchant_lc(&self) -> &str {
        &self.merchant_lc
    }

    pub fn comment_lc(&self) -> &str {
        &self.comment_lc
    }

    pub fn amount_formatted(&self) -> &str {
        &self.amount_formatted
    }

    pub fn date_formatted(&self) -> &str {
        &self.date_formatted
    }

    /// The source record, kept for inspection only.
    pub fn raw(&self) -> &RawRecord {
        &self.raw
    }
}

/// Turns heterogeneous upstream records into [`Transaction`]s, handing out ids in
/// arrival order.
#[derive(Debug, Default)]
pub struct Normalizer {
    next_id: u64,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&mut self, raw: RawRecord) -> Transaction {
        let id = TxId(self.next_id);
        self.next_id += 1;

        let date = first_text(&raw, DATE_FIELDS).unwrap_or_default();
        let merchant = first_text(&raw, MERCHANT_FIELDS).unwrap_or_default();
        let currency =
            first_text(&raw, CURRENCY_FIELDS).unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        let comment = first_text(&raw, COMMENT_FIELDS).unwrap_or_default();
        let amount_cents = amount_cents(&raw);

        Transaction {
            id,
            merchant_lc: merchant.to_lowercase(),
            comment_lc: comment.to_lowercase(),
            amount_formatted: amount_cents
                .map(|c| format_amount_cents(c, &currency))
                .unwrap_or_default(),
            date_formatted: format_date(&date),
            date,
            merchant,
            amount_cents,
            currency,
            comment,
            raw,
        }
    }

    /// Like [`Normalizer::normalize`], for list entries that may not be objects at all.
    pub fn normalize_value(&mut self, value: Value) -> Transaction {
        match value {
            Value::Object(map) => self.normalize(map),
            _ => self.normalize(RawRecord::new()),
        }
    }
}

/// First candidate that is a non-empty string or a non-zero number.
fn first_text(raw: &RawRecord, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|f| match raw.get(*f)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64().is_some_and(|v| v != 0.0) => Some(n.to_string()),
        _ => None,
    })
}

fn number(raw: &RawRecord, field: &str) -> Option<f64> {
    raw.get(field).and_then(Value::as_f64)
}

fn amount_cents(raw: &RawRecord) -> Option<i64> {
    if let Some(v) = raw.get("amount").and_then(Value::as_i64) {
        return Some(v);
    }
    if let Some(v) = number(raw, "amount") {
        return Some(round_half_up(v));
    }
    for field in ["amountCents", "amountInCents"] {
        if let Some(v) = number(raw, field) {
            return Some(round_half_up(v));
        }
    }
    number(raw, "amountUSD").map(|dollars| round_half_up(dollars * 100.0))
}

/// Halves round toward positive infinity: `-12.5` becomes `-12`, `12.5` becomes `13`.
fn round_half_up(v: f64) -> i64 {
    (v + 0.5).floor() as i64
}

/// Pulls the transaction list out of the response shapes the `Get` command has been
/// seen to return.
pub fn extract_transaction_list(payload: &Value) -> Vec<Value> {
    let candidates = [
        Some(payload),
        payload.get("transactionList"),
        payload.pointer("/transactionList/transactionList"),
        payload.get("transactions"),
        payload.pointer("/raw/transactions"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(Value::as_array)
        .cloned()
        .unwrap_or_default()
}
