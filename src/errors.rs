use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("Camera initialization error: {0}")]
    InitializationError(String),
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("Camera update error: {message}")]
    UpdateError {
        message: String,
        #[source]
        source: Box<CameraError>,
    },
    #[error("Invalid camera: {0}")]
    InvalidCamera(String),
    #[error("Execution rejected: {0}")]
    ExecutionRejected(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl CameraError {
    /// Wrap `source` as a reconciliation failure.
    pub fn update(message: impl Into<String>, source: CameraError) -> Self {
        CameraError::UpdateError {
            message: message.into(),
            source: Box::new(source),
        }
    }
}
