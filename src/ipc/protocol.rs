//! Line-delimited JSON messages exchanged with the device host.
//!
//! Payloads are raw bytes, carried as JSON arrays of numbers so the device
//! stays byte-transparent whatever the encoding of the text.
//!
//! Request (one JSON object per line):
//! ```json
//! {"op": "open"}
//! {"op": "write", "data": [104, 101, 108, 108, 111, 10], "length": 6}
//! {"op": "read", "length": 512}
//! {"op": "close"}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "session": "5f0c…"}
//! {"ok": true, "count": 5, "data": [104, 101, 108, 108, 111, 10]}
//! {"ok": false, "error": "device busy", "errno": -16}
//! ```

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Inbound request for one device operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DeviceRequest {
    /// Claim the device for this connection.
    Open,
    /// Replace the device buffer with `data`.
    Write {
        /// Payload bytes.
        data: Vec<u8>,
        /// Byte count to copy; defaults to the length of `data`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        length: Option<usize>,
    },
    /// Read back the device buffer.
    Read {
        /// Size of the caller's receive buffer.
        length: usize,
    },
    /// Release the device.
    Close,
}

impl DeviceRequest {
    /// Short verb used in logs.
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Write { .. } => "write",
            Self::Read { .. } => "read",
            Self::Close => "close",
        }
    }
}

/// Outbound response to a [`DeviceRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceResponse {
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Session identifier returned by `open`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Reported count returned by `write` and `read`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Bytes returned by `read`, without trailing zero padding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Negative status code on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
}

impl DeviceResponse {
    /// Successful `open`.
    #[must_use]
    pub fn opened(session: impl Into<String>) -> Self {
        Self {
            ok: true,
            session: Some(session.into()),
            ..Self::default()
        }
    }

    /// Successful `write`.
    #[must_use]
    pub fn written(count: usize) -> Self {
        Self {
            ok: true,
            count: Some(count),
            ..Self::default()
        }
    }

    /// Successful `read`.
    #[must_use]
    pub fn read(count: usize, data: impl Into<Vec<u8>>) -> Self {
        Self {
            ok: true,
            count: Some(count),
            data: Some(data.into()),
            ..Self::default()
        }
    }

    /// Successful `close`.
    #[must_use]
    pub fn closed() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    /// Failed operation.
    #[must_use]
    pub fn failure(err: &AppError) -> Self {
        Self {
            ok: false,
            error: Some(err.to_string()),
            errno: Some(err.errno()),
            ..Self::default()
        }
    }

    /// Turn a failure response back into the error it carries.
    ///
    /// # Errors
    ///
    /// Returns the `AppError` matching `errno` when `ok` is false.
    pub fn into_result(self) -> Result<Self> {
        if self.ok {
            return Ok(self);
        }
        let message = self.error.unwrap_or_else(|| "unknown error".to_owned());
        Err(AppError::from_errno(
            self.errno.unwrap_or(crate::errors::EIO),
            message,
        ))
    }
}

/// Strip the zero padding a device read leaves after the content.
#[must_use]
pub fn trim_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}
