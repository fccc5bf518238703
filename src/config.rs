use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// How long a saved auth token is honored.
pub const TOKEN_TTL_DAYS: i64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub fn token_path() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    let mut p = PathBuf::from(home);
    p.push(".config");
    p.push("expensify-tx-cli");
    p.push("token");
    p
}

pub fn load_stored_token(path: &Path) -> anyhow::Result<StoredToken> {
    let s = fs::read_to_string(path)?;
    let stored: StoredToken = serde_json::from_str(s.trim())?;
    if stored.token.trim().is_empty() {
        anyhow::bail!("empty token file");
    }
    Ok(stored)
}

/// Returns the saved token unless it is missing, empty or expired as of `now`.
pub fn load_token_at(path: &Path, now: DateTime<Utc>) -> anyhow::Result<String> {
    let stored = load_stored_token(path)?;
    if stored.expires_at <= now {
        anyhow::bail!("token expired at {}", stored.expires_at.to_rfc3339());
    }
    Ok(stored.token.trim().to_string())
}

pub fn load_token(path: &Path) -> anyhow::Result<String> {
    load_token_at(path, Utc::now())
}

pub fn save_token(path: &Path, token: &str) -> anyhow::Result<StoredToken> {
    save_token_at(path, token, Utc::now())
}

pub fn save_token_at(path: &Path, token: &str, now: DateTime<Utc>) -> anyhow::Result<StoredToken> {
    let token = token.trim();
    if token.is_empty() {
        anyhow::bail!("empty token");
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let stored = StoredToken {
        token: token.to_string(),
        expires_at: now + Duration::days(TOKEN_TTL_DAYS),
    };
    let mut f = fs::File::create(path)?;
    #[cfg(unix)]
    f.set_permissions(fs::Permissions::from_mode(0o600))?;
    f.write_all(serde_json::to_string(&stored)?.as_bytes())?;
    f.write_all(b"\n")?;
    Ok(stored)
}

/// Removes the saved token. Returns whether there was one.
pub fn erase_token(path: &Path) -> anyhow::Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(path)?;
    Ok(true)
}
