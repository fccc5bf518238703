use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Column a view can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    Date,
    Merchant,
    Amount,
    Currency,
    Comment,
}

impl SortKey {
    /// Comparison used when a header is activated without an explicit type.
    pub fn default_type(self) -> SortType {
        match self {
            SortKey::Date => SortType::Date,
            SortKey::Amount => SortType::Number,
            SortKey::Merchant | SortKey::Currency | SortKey::Comment => SortType::Text,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SortKey::Date => "date",
            SortKey::Merchant => "merchant",
            SortKey::Amount => "amountCents",
            SortKey::Currency => "currency",
            SortKey::Comment => "comment",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortType {
    Text,
    Number,
    Date,
}

impl fmt::Display for SortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SortType::Text => "text",
            SortType::Number => "number",
            SortType::Date => "date",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl SortDirection {
    pub fn apply(self, ord: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
    #[serde(rename = "type")]
    pub sort_type: SortType,
}

impl SortSpec {
    pub fn new(key: SortKey, sort_type: SortType, direction: SortDirection) -> Self {
        Self {
            key,
            direction,
            sort_type,
        }
    }

    /// Next spec after a header activation: the same key flips an ascending sort to
    /// descending, anything else starts ascending.
    pub fn toggled(current: Option<&SortSpec>, key: SortKey, sort_type: SortType) -> SortSpec {
        let direction = match current {
            Some(c) if c.key == key && c.direction == SortDirection::Ascending => {
                SortDirection::Descending
            }
            _ => SortDirection::Ascending,
        };
        SortSpec::new(key, sort_type, direction)
    }
}

/// The only commands the proxy forwards upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProxyCommand {
    Authenticate,
    Get,
    CreateTransaction,
}

impl ProxyCommand {
    pub const ALL: [ProxyCommand; 3] = [
        ProxyCommand::Authenticate,
        ProxyCommand::Get,
        ProxyCommand::CreateTransaction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProxyCommand::Authenticate => "Authenticate",
            ProxyCommand::Get => "Get",
            ProxyCommand::CreateTransaction => "CreateTransaction",
        }
    }
}

impl fmt::Display for ProxyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProxyCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProxyCommand::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command {0:?}")]
pub struct UnknownCommand(pub String);

/// Whether a manually entered amount leaves (debit) or enters (credit) the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Debit,
    Credit,
}

impl EntryKind {
    pub fn signed_cents(self, cents: i64) -> i64 {
        match self {
            EntryKind::Debit => -cents.abs(),
            EntryKind::Credit => cents.abs(),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryKind::Debit => "debit",
            EntryKind::Credit => "credit",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_toggles_and_new_key_resets() {
        let first = SortSpec::toggled(None, SortKey::Merchant, SortType::Text);
        assert_eq!(first.direction, SortDirection::Ascending);

        let second = SortSpec::toggled(Some(&first), SortKey::Merchant, SortType::Text);
        assert_eq!(second.direction, SortDirection::Descending);

        let third = SortSpec::toggled(Some(&second), SortKey::Merchant, SortType::Text);
        assert_eq!(third.direction, SortDirection::Ascending);

        let other = SortSpec::toggled(Some(&second), SortKey::Amount, SortType::Number);
        assert_eq!(other.key, SortKey::Amount);
        assert_eq!(other.direction, SortDirection::Ascending);
    }

    #[test]
    fn proxy_command_parses_only_allowed_names() {
        assert_eq!("Get".parse::<ProxyCommand>(), Ok(ProxyCommand::Get));
        assert_eq!(
            "CreateTransaction".parse::<ProxyCommand>(),
            Ok(ProxyCommand::CreateTransaction)
        );
        assert!("get".parse::<ProxyCommand>().is_err());
        assert!("DeleteEverything".parse::<ProxyCommand>().is_err());
    }

    #[test]
    fn entry_kind_signs_amounts() {
        assert_eq!(EntryKind::Debit.signed_cents(1250), -1250);
        assert_eq!(EntryKind::Debit.signed_cents(-1250), -1250);
        assert_eq!(EntryKind::Credit.signed_cents(-1250), 1250);
    }
}
