use thiserror::Error;

use crate::recorder::RecorderState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("recorder is not recording (state: {0:?})")]
    NotRecording(RecorderState),

    #[error("custom event name must not be empty")]
    EmptyEventName,

    #[error("payload could not be encoded: {0}")]
    Payload(String),
}

impl From<serde_json::Error> for CaptureError {
    fn from(e: serde_json::Error) -> Self {
        CaptureError::Payload(e.to_string())
    }
}
