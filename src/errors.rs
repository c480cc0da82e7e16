//! Error types shared across the driver, transport, and client.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Negative status returned for a busy device (`EBUSY`).
pub const EBUSY: i32 = -16;
/// Negative status returned for a faulted boundary copy (`EFAULT`).
pub const EFAULT: i32 = -14;
/// Negative status returned for protocol misuse (`EINVAL`).
pub const EINVAL: i32 = -22;
/// Negative status returned for any other I/O failure (`EIO`).
pub const EIO: i32 = -5;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// The endpoint already has an open session.
    DeviceBusy,
    /// A boundary copy touched a region the caller does not own.
    InvalidAddress(String),
    /// Device identifier assignment or name publication failed.
    Registration(String),
    /// Configuration parsing or validation failure.
    Config(String),
    /// Local socket communication failure.
    Ipc(String),
    /// Malformed request or an operation issued in the wrong session state.
    Protocol(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Negative status code reported to callers for this error.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::DeviceBusy => EBUSY,
            Self::InvalidAddress(_) => EFAULT,
            Self::Protocol(_) | Self::Config(_) => EINVAL,
            Self::Registration(_) | Self::Ipc(_) | Self::Io(_) => EIO,
        }
    }

    /// Rebuild an error from a status code and message received over the wire.
    #[must_use]
    pub fn from_errno(errno: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        match errno {
            EBUSY => Self::DeviceBusy,
            EFAULT => Self::InvalidAddress(message),
            EINVAL => Self::Protocol(message),
            _ => Self::Io(message),
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeviceBusy => write!(f, "device busy"),
            Self::InvalidAddress(msg) => write!(f, "invalid address: {msg}"),
            Self::Registration(msg) => write!(f, "registration: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("invalid json: {err}"))
    }
}
