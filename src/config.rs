//! Device host configuration parsing and validation.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// How a write or read turns the transferred bytes into a reported count.
#[derive(
    Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum LengthConvention {
    /// Bytes before the first zero byte, minus one for the line terminator.
    ///
    /// A payload without a trailing `\n` is undercounted by one.
    #[default]
    Terminator,
    /// Bytes before the first zero byte, minus a trailing `\n` when present.
    Exact,
}

impl LengthConvention {
    /// Compute the reported count for `content`.
    ///
    /// Only bytes before the first zero byte are considered; the buffer is
    /// zero-padded, so that is where the text ends.
    #[must_use]
    pub fn reported_count(self, content: &[u8]) -> usize {
        let text_len = content
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(content.len());
        match self {
            Self::Terminator => text_len.saturating_sub(1),
            Self::Exact => {
                if text_len > 0 && content[text_len - 1] == b'\n' {
                    text_len - 1
                } else {
                    text_len
                }
            }
        }
    }
}

fn default_device_name() -> String {
    crate::device::DEVICE_NAME.into()
}

/// Global configuration parsed from `chardev.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DeviceConfig {
    /// Well-known name the device is published under.
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Minor number requested for the single device instance.
    #[serde(default)]
    pub minor: u32,
    /// Reported-count convention for writes and reads.
    #[serde(default)]
    pub length_convention: LengthConvention,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            minor: 0,
            length_convention: LengthConvention::default(),
        }
    }
}

impl DeviceConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Path the device would occupy in a `/dev` tree.
    #[must_use]
    pub fn device_path(&self) -> String {
        format!("/dev/{}", self.device_name)
    }

    /// Check the device name is usable as a socket name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an empty name or one containing a path
    /// separator or whitespace.
    pub fn validate(&self) -> Result<()> {
        if self.device_name.is_empty() {
            return Err(AppError::Config("device_name must not be empty".into()));
        }

        if self
            .device_name
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_whitespace())
        {
            return Err(AppError::Config(format!(
                "device_name '{}' must not contain separators or whitespace",
                self.device_name
            )));
        }

        Ok(())
    }
}
