//! No-op authentication for public endpoints.

use crate::auth::CloudAuth;
use crate::error::Result;
use async_trait::async_trait;

/// No authentication: Earth Search and its public Sentinel-2 COGs.
pub struct NoAuth;

#[async_trait]
impl CloudAuth for NoAuth {
    async fn sign_request(
        &self,
        _url: &str,
        _method: &str,
        _headers: &mut Vec<(String, String)>,
    ) -> Result<()> {
        Ok(())
    }
}
