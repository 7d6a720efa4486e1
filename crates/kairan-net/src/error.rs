//! Errors for the link-preview fetcher.
//!
//! Push delivery reports through [`kairan_core::PushError`]; previews
//! surface to the caller, who turns them into a JSON error response.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("invalid preview url: {0}")]
    InvalidUrl(String),

    #[error("preview request failed: {0}")]
    Request(String),

    #[error("preview request returned status {0}")]
    Status(u16),

    #[error("preview request timed out")]
    Timeout,
}

pub type PreviewResult<T> = Result<T, PreviewError>;
