//! Error types for catalog, authentication and remote raster access.

use thiserror::Error;

/// Errors produced by the cloud layer.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("server does not support Range requests for {url}")]
    RangeNotSupported { url: String },

    #[error("invalid TIFF: {reason}")]
    InvalidTiff { reason: String },

    #[error("unsupported compression: {0}")]
    UnsupportedCompression(u16),

    #[error("unsupported predictor: {0}")]
    UnsupportedPredictor(u16),

    #[error("unsupported data type: bits_per_sample={bps}, sample_format={sf}")]
    UnsupportedDataType { bps: u16, sf: u16 },

    #[error("unsupported planar configuration: {0} (only chunky=1 supported)")]
    UnsupportedPlanarConfig(u16),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("no IFD entries found in TIFF")]
    NoIfd,

    #[error("requested window does not intersect raster extent")]
    WindowOutside,

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response too small: {size} bytes (minimum {min})")]
    ResponseTooSmall { size: usize, min: usize },

    #[error("core error: {0}")]
    Core(#[from] s2cuts_core::Error),
}

impl CloudError {
    /// Whether retrying the same request may succeed.
    ///
    /// Timeouts, connection failures and 5xx/429 responses are transient;
    /// other 4xx responses and decoding errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Network(_) => true,
            _ => false,
        }
    }
}

/// Result alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> CloudError {
        CloudError::Status {
            status: code,
            url: "https://example.com".into(),
            body: String::new(),
        }
    }

    #[test]
    fn transient_classification() {
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(404).is_transient());
        assert!(!status(401).is_transient());
        assert!(!CloudError::NoIfd.is_transient());
        assert!(CloudError::Network("reset".into()).is_transient());
    }
}
