//! OAuth2 client-credentials bearer tokens (Copernicus Data Space).
//!
//! The token is requested lazily on first use and refreshed shortly before
//! it expires, so long batch runs keep a valid `Authorization` header.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::auth::CloudAuth;
use crate::error::{CloudError, Result};

/// Copernicus Data Space Ecosystem identity endpoint.
pub const CDSE_TOKEN_URL: &str =
    "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token";

/// Tokens are refreshed this long before their reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_LIFETIME: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn from_response(resp: TokenResponse, now: Instant) -> Self {
        let lifetime = resp
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LIFETIME);
        Self {
            access_token: resp.access_token,
            expires_at: now + lifetime,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }
}

/// OAuth2 client-credentials flow with an in-memory token cache.
pub struct ClientCredentials {
    token_url: String,
    client_id: String,
    client_secret: String,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl ClientCredentials {
    /// Credentials for the Copernicus Data Space identity service.
    pub fn new(client_id: &str, client_secret: &str) -> Result<Self> {
        Self::with_token_url(CDSE_TOKEN_URL, client_id, client_secret)
    }

    /// Credentials against an arbitrary token endpoint.
    pub fn with_token_url(token_url: &str, client_id: &str, client_secret: &str) -> Result<Self> {
        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            return Err(CloudError::Auth(
                "client id and client secret must both be set".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            client,
            token: Mutex::new(None),
        })
    }

    /// Current access token, requesting a new one if none is cached or the
    /// cached one is about to expire.
    pub async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        let now = Instant::now();
        if let Some(token) = guard.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.access_token.clone());
        }

        let token = self.request_token().await?;
        let access = token.access_token.clone();
        *guard = Some(token);
        Ok(access)
    }

    async fn request_token(&self) -> Result<CachedToken> {
        debug!(url = %self.token_url, "requesting OAuth token");
        let resp = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CloudError::Auth(format!("token request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Auth(format!(
                "token endpoint returned HTTP {}: {}",
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        let parsed: TokenResponse = resp
            .json()
            .await
            .map_err(|e| CloudError::Auth(format!("parsing token response: {e}")))?;
        Ok(CachedToken::from_response(parsed, Instant::now()))
    }
}

#[async_trait]
impl CloudAuth for ClientCredentials {
    async fn sign_request(
        &self,
        _url: &str,
        _method: &str,
        headers: &mut Vec<(String, String)>,
    ) -> Result<()> {
        let token = self.access_token().await?;
        headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        Ok(())
    }
}

/// A fixed bearer token.
pub struct BearerToken(pub String);

#[async_trait]
impl CloudAuth for BearerToken {
    async fn sign_request(
        &self,
        _url: &str,
        _method: &str,
        headers: &mut Vec<(String, String)>,
    ) -> Result<()> {
        headers.push(("Authorization".to_string(), format!("Bearer {}", self.0)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_parsing() {
        let json = r#"{"access_token":"abc","expires_in":600,"token_type":"Bearer","refresh_expires_in":0}"#;
        let resp: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.access_token, "abc");
        assert_eq!(resp.expires_in, Some(600));
    }

    #[test]
    fn freshness_respects_margin() {
        let now = Instant::now();
        let token = CachedToken::from_response(
            TokenResponse {
                access_token: "t".into(),
                expires_in: Some(600),
            },
            now,
        );
        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + Duration::from_secs(545)));

        let short = CachedToken::from_response(
            TokenResponse {
                access_token: "t".into(),
                expires_in: Some(30),
            },
            now,
        );
        assert!(!short.is_fresh(now));
    }

    #[test]
    fn empty_credentials_rejected() {
        assert!(ClientCredentials::new("", "secret").is_err());
        assert!(ClientCredentials::new("id", "  ").is_err());
        assert!(ClientCredentials::new("id", "secret").is_ok());
    }

    #[tokio::test]
    async fn bearer_token_header() {
        let auth = BearerToken("xyz".into());
        let mut headers = Vec::new();
        auth.sign_request("https://example.com", "GET", &mut headers)
            .await
            .unwrap();
        assert_eq!(headers, vec![("Authorization".to_string(), "Bearer xyz".to_string())]);
    }
}
