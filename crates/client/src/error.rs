// ============================
// crates/client/src/error.rs
// ============================
//! Client-side error type.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The room, permalink or teacher does not exist
    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The server's persistence is down; safe to retry later
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Wrong room key, tampered ciphertext or a malformed iv
    #[error("Crypto failure: {0}")]
    Crypto(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    /// Any other non-success status
    #[error("Unexpected status {status}: {error}")]
    Status { status: u16, error: String },
}

impl ClientError {
    /// An unavailable store or a request that never got an answer is worth
    /// another attempt; anything the server actually rejected is not
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::StoreUnavailable(_) => true,
            ClientError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refused_connection_is_retryable() {
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:1/api/health")
            .send()
            .await
            .unwrap_err();
        assert!(ClientError::from(err).is_retryable());
    }

    #[test]
    fn test_server_rejections_are_not_retryable() {
        assert!(ClientError::StoreUnavailable("down".into()).is_retryable());
        assert!(!ClientError::NotFound.is_retryable());
        assert!(!ClientError::Forbidden.is_retryable());
        assert!(!ClientError::Crypto("bad tag".into()).is_retryable());
        assert!(!ClientError::Status {
            status: 500,
            error: "internal_error".into()
        }
        .is_retryable());
    }
}
