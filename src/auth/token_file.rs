use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::store::write_json_atomic;

/// Tokens closer than this to expiry are refreshed early.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Authorized-user token file (access token, refresh token, client identity).
/// Unknown fields are carried through on save.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizedUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthorizedUser {
    pub fn expiry_time(&self) -> Option<DateTime<Utc>> {
        let raw = self.expiry.as_deref()?;
        if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
            return Some(t.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|t| t.and_utc())
    }

    /// The stored access token, unless it expires within the skew window.
    /// A token without expiry is taken as valid.
    pub fn valid_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.token.as_deref().filter(|t| !t.is_empty())?;
        match self.expiry_time() {
            Some(exp) if exp <= now + Duration::seconds(EXPIRY_SKEW_SECS) => None,
            _ => Some(token),
        }
    }

    pub fn set_token(&mut self, access_token: String, expires_at: DateTime<Utc>) {
        self.token = Some(access_token);
        self.expiry = Some(expires_at.to_rfc3339_opts(SecondsFormat::Micros, true));
    }
}

/// Client id/secret from an OAuth client credentials file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<ClientCredentials>,
    web: Option<ClientCredentials>,
}

pub fn load_authorized_user(path: &Path) -> Result<AuthorizedUser> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("reading token file {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing token file {}", path.display()))
}

/// Replaces the token file atomically; a failed write leaves the previous token intact.
pub fn save_authorized_user(path: &Path, user: &AuthorizedUser) -> Result<()> {
    write_json_atomic(path, user).with_context(|| format!("saving token file {}", path.display()))
}

pub fn load_client_credentials(path: &Path) -> Result<ClientCredentials> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("reading credentials file {}", path.display()))?;
    let file: CredentialsFile = serde_json::from_str(&s)
        .with_context(|| format!("parsing credentials file {}", path.display()))?;
    file.installed
        .or(file.web)
        .ok_or_else(|| anyhow!("{} has no 'installed' or 'web' client", path.display()))
}
