use std::cmp::Ordering;
use std::rc::Rc;

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::format::parse_timestamp;
use crate::normalize::Transaction;
use crate::types::{SortDirection, SortKey, SortSpec, SortType};

/// Narrows `all` to transactions whose merchant or comment contains `query`.
///
/// An empty (or whitespace-only) query hands back the same elements in the same order,
/// so row caches keyed on transaction identity stay warm.
pub fn filter(all: &[Rc<Transaction>], query: &str) -> Vec<Rc<Transaction>> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return all.to_vec();
    }
    all.iter()
        .filter(|t| t.merchant_lc().contains(&q) || t.comment_lc().contains(&q))
        .cloned()
        .collect()
}

/// Stable sort into a new vector; the input is left untouched.
pub fn sort(
    view: &[Rc<Transaction>],
    key: SortKey,
    sort_type: SortType,
    direction: SortDirection,
) -> Vec<Rc<Transaction>> {
    let mut out = view.to_vec();
    out.sort_by(|a, b| compare(a, b, key, sort_type, direction));
    out
}

pub fn sort_by_spec(view: &[Rc<Transaction>], spec: &SortSpec) -> Vec<Rc<Transaction>> {
    sort(view, spec.key, spec.sort_type, spec.direction)
}

fn compare(
    a: &Transaction,
    b: &Transaction,
    key: SortKey,
    sort_type: SortType,
    direction: SortDirection,
) -> Ordering {
    match sort_type {
        SortType::Number => direction.apply(number_value(a, key).total_cmp(&number_value(b, key))),
        // Unparsable dates trail parsable ones in either direction.
        SortType::Date => match (date_value(a, key), date_value(b, key)) {
            (Some(x), Some(y)) => direction.apply(x.cmp(&y)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortType::Text => direction.apply(collate(&text_value(a, key), &text_value(b, key))),
    }
}

fn text_value(t: &Transaction, key: SortKey) -> String {
    match key {
        SortKey::Date => t.date().to_string(),
        SortKey::Merchant => t.merchant().to_string(),
        SortKey::Amount => t.amount_cents().map(|c| c.to_string()).unwrap_or_default(),
        SortKey::Currency => t.currency().to_string(),
        SortKey::Comment => t.comment().to_string(),
    }
}

fn number_value(t: &Transaction, key: SortKey) -> f64 {
    let v = match key {
        SortKey::Amount => t.amount_cents().map(|c| c as f64),
        _ => text_value(t, key).trim().parse::<f64>().ok(),
    };
    v.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn date_value(t: &Transaction, key: SortKey) -> Option<i64> {
    parse_timestamp(&text_value(t, key))
}

/// Base-letter comparison: case and accents are ignored (`Éclair == eclair`) and embedded
/// digit runs compare numerically, so `item2` sorts before `item10`.
pub fn collate(a: &str, b: &str) -> Ordering {
    let a = fold(a);
    let b = fold(b);
    let mut xs = a.chars().peekable();
    let mut ys = b.chars().peekable();
    loop {
        match (xs.peek().copied(), ys.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let left = take_digits(&mut xs);
                let right = take_digits(&mut ys);
                let ord = compare_digit_runs(&left, &right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.cmp(&y);
                if ord != Ordering::Equal {
                    return ord;
                }
                xs.next();
                ys.next();
            }
        }
    }
}

/// Decomposes, drops combining marks and lowercases.
fn fold(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

fn take_digits(it: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(c) = it.peek().copied().filter(char::is_ascii_digit) {
        out.push(c);
        it.next();
    }
    out
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
