use anyhow::{Result, anyhow};
use chrono::Utc;
use std::path::PathBuf;

use crate::auth::oauth::{self, ClientIdentity, GOOGLE_TOKEN_URL};
use crate::auth::{TokenSource, token_file};
use crate::config::Config;

/// Reads the authorized-user token file, refreshing it when the stored token is stale.
#[derive(Clone)]
pub struct TokenManager {
    pub token_path: PathBuf,
    pub credentials_path: PathBuf,
}

impl TokenManager {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            token_path: cfg.token_path.clone(),
            credentials_path: cfg.credentials_path.clone(),
        }
    }

    /// Client id from the token file, else from the client credentials file.
    fn client_identity(&self, user: &token_file::AuthorizedUser) -> Result<ClientIdentity> {
        let (client_id, client_secret, creds_token_uri) = match &user.client_id {
            Some(id) => (id.clone(), user.client_secret.clone(), None),
            None => {
                let creds = token_file::load_client_credentials(&self.credentials_path)
                    .map_err(|e| {
                        anyhow!(
                            "no client_id in {} and no usable credentials: {e:#}",
                            self.token_path.display()
                        )
                    })?;
                (creds.client_id, creds.client_secret, creds.token_uri)
            }
        };

        let token_uri = user
            .token_uri
            .clone()
            .or(creds_token_uri)
            .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string());

        Ok(ClientIdentity {
            client_id,
            client_secret,
            token_uri,
        })
    }
}

impl TokenSource for TokenManager {
    fn access_token(&self) -> Result<String> {
        let now = Utc::now();
        let mut user = token_file::load_authorized_user(&self.token_path)?;

        if let Some(at) = user.valid_token(now) {
            return Ok(at.to_string());
        }

        let rt = user.refresh_token.clone().ok_or_else(|| {
            anyhow!(
                "access token in {} expired and no refresh token is available",
                self.token_path.display()
            )
        })?;
        let identity = self.client_identity(&user)?;

        log::info!("Refreshing access token");
        let fresh = oauth::refresh(&identity, &rt, now)?;

        user.set_token(fresh.access_token.clone(), fresh.expires_at);
        if let Some(rotated) = fresh.refresh_token {
            user.refresh_token = Some(rotated);
        }
        if let Err(e) = token_file::save_authorized_user(&self.token_path, &user) {
            log::warn!("Couldn't write refreshed token back: {e:#}");
        }

        Ok(fresh.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &std::path::Path) -> TokenManager {
        TokenManager {
            token_path: dir.join("token.json"),
            credentials_path: dir.join("credentials.json"),
        }
    }

    #[test]
    fn returns_stored_token_without_network() {
        let temp = tempfile::tempdir().expect("temp dir");
        let exp = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        std::fs::write(
            temp.path().join("token.json"),
            format!(r#"{{"token":"ya29.live","expiry":"{exp}"}}"#),
        )
        .unwrap();
        assert_eq!(manager(temp.path()).access_token().unwrap(), "ya29.live");
    }

    #[test]
    fn missing_token_file_is_an_error() {
        let temp = tempfile::tempdir().expect("temp dir");
        assert!(manager(temp.path()).access_token().is_err());
    }

    #[test]
    fn expired_without_refresh_token_is_an_error() {
        let temp = tempfile::tempdir().expect("temp dir");
        std::fs::write(
            temp.path().join("token.json"),
            r#"{"token":"old","expiry":"2000-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let err = manager(temp.path()).access_token().unwrap_err();
        assert!(err.to_string().contains("no refresh token"));
    }

    #[test]
    fn client_identity_falls_back_to_credentials_file() {
        let temp = tempfile::tempdir().expect("temp dir");
        std::fs::write(
            temp.path().join("credentials.json"),
            r#"{"installed":{"client_id":"cid","client_secret":"s"}}"#,
        )
        .unwrap();
        let m = manager(temp.path());
        let user = token_file::AuthorizedUser::default();
        let identity = m.client_identity(&user).unwrap();
        assert_eq!(identity.client_id, "cid");
        assert_eq!(identity.client_secret.as_deref(), Some("s"));
        assert_eq!(identity.token_uri, GOOGLE_TOKEN_URL);
    }
}
