use axum::http::header::InvalidHeaderValue;

use super::codec::CodecError;
use super::record_store::StoreError;
use super::serializer::SerializerError;
use super::types::Session;

/// Errors surfaced by [`SessionStore`](super::SessionStore) operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Serialized payload exceeds the configured maximum length
    #[error("SessionStore: the value to store is too big ({size} bytes, limit {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Session serialization failed: {0}")]
    Serializer(#[from] SerializerError),

    #[error("Session cookie error: {0}")]
    Codec(#[from] CodecError),

    /// Backend failure, passed through as reported
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid Set-Cookie header: {0}")]
    Header(#[from] InvalidHeaderValue),
}

/// Loading failed, but a usable fresh session was still built.
///
/// The record could not be read, so the caller gets an empty, new session
/// alongside the cause and decides whether to carry on with it.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct SessionLoadError {
    pub session: Session,
    pub source: SessionError,
}

impl SessionLoadError {
    pub fn into_session(self) -> Session {
        self.session
    }
}
