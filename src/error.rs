use thiserror::Error;

use crate::identity::{AuthFailure, ResetFailure};
use crate::models::{ExamType, ResponseStyle};

pub type Result<T> = std::result::Result<T, OverlayError>;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("response style '{style}' is not valid for a {exam_type} exam")]
    ConfigValidation {
        exam_type: ExamType,
        style: ResponseStyle,
    },

    #[error("confirmation has not been requested for this draft")]
    NotArmed,

    #[error("not signed in")]
    SignedOut,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("generation API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("sign-in failed: {0}")]
    Auth(AuthFailure),

    #[error("password reset failed: {0}")]
    Reset(ResetFailure),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for OverlayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            OverlayError::Decode(err.to_string())
        } else {
            OverlayError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for OverlayError {
    fn from(err: serde_json::Error) -> Self {
        OverlayError::Decode(err.to_string())
    }
}
