use thiserror::Error;

/// Errors surfaced by the controller to its callers.
///
/// Every public operation either succeeds or yields exactly one of these.
/// `code()` gives the stable string carried in command replies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("no usable camera device: {0}")]
    DeviceUnavailable(String),
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    #[error("capture session could not be configured: {0}")]
    ConfigureFailed(String),
    #[error("camera not ready")]
    NotReady,
    #[error("capture already in progress")]
    Busy,
    #[error("no image to acquire")]
    NoImage,
    #[error("capture error: {0}")]
    CaptureError(String),
    #[error("malformed setting {key}: {reason}")]
    Malformed { key: String, reason: String },
    #[error("hardware rejected request: {0}")]
    Hardware(String),
    #[error("worker context error: {0}")]
    Worker(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl ControllerError {
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Stable reply code for the command surface.
    pub fn code(&self) -> &'static str {
        match self {
            ControllerError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
            ControllerError::PermissionDenied(_) => "PERMISSION_DENIED",
            ControllerError::ConfigureFailed(_) => "CONFIGURE_FAILED",
            ControllerError::NotReady => "NO_CAMERA",
            ControllerError::Busy => "BUSY",
            ControllerError::NoImage => "NO_IMAGE",
            ControllerError::CaptureError(_) => "CAPTURE_ERR",
            ControllerError::Malformed { .. } => "MALFORMED",
            ControllerError::Hardware(_) => "HARDWARE_ERR",
            ControllerError::Worker(_) => "WORKER_ERR",
            ControllerError::Config(_) => "CONFIG_ERR",
        }
    }

    /// Map a backend failure raised while opening a device.
    pub fn from_open(error: HardwareError) -> Self {
        match error {
            HardwareError::AccessDenied(msg) => ControllerError::PermissionDenied(msg),
            other => ControllerError::DeviceUnavailable(other.to_string()),
        }
    }
}

/// Failures reported by a camera backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("device in use: {0}")]
    InUse(String),
    #[error("device disconnected")]
    Disconnected,
    #[error("unknown device: {0}")]
    UnknownDevice(String),
    #[error("{0}")]
    Failure(String),
}

/// Failures reported by a storage sink.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write capture: {0}")]
    Io(#[from] std::io::Error),
    #[error("unrecognized image encoding: {0}")]
    Encoding(String),
    #[error("{0}")]
    Rejected(String),
}
