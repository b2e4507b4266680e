use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::reqwest::http_client;
use oauth2::{AuthUrl, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_LIFETIME_SECS: i64 = 3500;

/// Who we are to the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub token_uri: String,
}

#[derive(Debug)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Set only when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

fn expiry_from(now: DateTime<Utc>, expires_in: Option<std::time::Duration>) -> DateTime<Utc> {
    let secs = expires_in
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .unwrap_or(DEFAULT_LIFETIME_SECS);
    now + Duration::seconds(secs)
}

/// Refresh-token grant against `identity.token_uri`. Blocks on the oauth2 reqwest client.
pub fn refresh(
    identity: &ClientIdentity,
    refresh_token: &str,
    now: DateTime<Utc>,
) -> Result<RefreshedToken> {
    let token_url = TokenUrl::new(identity.token_uri.clone())
        .map_err(|e| anyhow!("invalid token_uri '{}': {e}", identity.token_uri))?;
    let client = BasicClient::new(
        ClientId::new(identity.client_id.clone()),
        identity.client_secret.clone().map(ClientSecret::new),
        AuthUrl::new(GOOGLE_AUTH_URL.to_string())?,
        Some(token_url),
    );

    let response = client
        .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
        .request(http_client)
        .map_err(|e| anyhow!("token refresh failed: {e}"))?;

    Ok(RefreshedToken {
        access_token: response.access_token().secret().to_string(),
        refresh_token: response.refresh_token().map(|r| r.secret().to_string()),
        expires_at: expiry_from(now, response.expires_in()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn expiry_defaults_when_provider_is_silent() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(
            expiry_from(now, Some(std::time::Duration::from_secs(3599))),
            now + Duration::seconds(3599)
        );
        assert_eq!(expiry_from(now, None), now + Duration::seconds(3500));
    }

    #[test]
    fn bad_token_uri_is_rejected_before_any_request() {
        let identity = ClientIdentity {
            client_id: "cid".into(),
            client_secret: None,
            token_uri: "not a url".into(),
        };
        let err = refresh(&identity, "r1", Utc::now()).unwrap_err();
        assert!(err.to_string().contains("invalid token_uri"));
    }
}
