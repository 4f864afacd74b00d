//! Request authentication for catalog and processing endpoints.

mod none;
mod oauth;

pub use none::NoAuth;
pub use oauth::{BearerToken, ClientCredentials, CDSE_TOKEN_URL};

use crate::error::Result;
use async_trait::async_trait;

/// Trait for adding authentication headers to outgoing HTTP requests.
///
/// Signing is async so implementations can fetch or refresh tokens.
#[async_trait]
pub trait CloudAuth: Send + Sync {
    /// Sign a request by appending authentication headers.
    ///
    /// `url` is the full request URL, `headers` collects
    /// `(name, value)` pairs to set on the request.
    async fn sign_request(
        &self,
        url: &str,
        method: &str,
        headers: &mut Vec<(String, String)>,
    ) -> Result<()>;
}
