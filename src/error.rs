//! Crate-wide error taxonomy.
//!
//! Decode and construction failures surface synchronously to the caller of
//! the triggering operation; transport failures surface as the error branch
//! of the async call. Nothing here is retried, and a corrupt persisted
//! snapshot is swallowed by restore rather than surfaced.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed token: {0}")]
    MalformedToken(&'static str),

    #[error("invalid credential response: missing {0}")]
    InvalidCredentialResponse(&'static str),

    #[error("transport error")]
    Transport(#[from] reqwest::Error),

    #[error("request failed ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("invalid base URL")]
    BaseUrl(#[from] url::ParseError),

    #[error("corrupt persisted session state")]
    CorruptPersistedState,
}
