//! Unit tests for `AppError` display format and status codes.

use chardev::errors::{EBUSY, EFAULT, EINVAL, EIO};
use chardev::AppError;

#[test]
fn device_busy_displays_plainly() {
    assert_eq!(AppError::DeviceBusy.to_string(), "device busy");
}

#[test]
fn invalid_address_display_includes_message() {
    let err = AppError::InvalidAddress("caller region is unmapped".into());
    assert_eq!(err.to_string(), "invalid address: caller region is unmapped");
}

#[test]
fn error_message_no_trailing_period() {
    let err = AppError::Registration("no free dynamic major number".into());
    let s = err.to_string();
    assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
}

#[test]
fn errno_matches_reference_status_codes() {
    assert_eq!(AppError::DeviceBusy.errno(), EBUSY);
    assert_eq!(AppError::InvalidAddress(String::new()).errno(), EFAULT);
    assert_eq!(AppError::Protocol(String::new()).errno(), EINVAL);
    assert_eq!(AppError::Ipc(String::new()).errno(), EIO);
    assert!(EBUSY < 0 && EFAULT < 0 && EINVAL < 0);
}

#[test]
fn from_errno_restores_device_errors() {
    assert_eq!(AppError::from_errno(EBUSY, "device busy"), AppError::DeviceBusy);
    assert_eq!(
        AppError::from_errno(EFAULT, "bad"),
        AppError::InvalidAddress("bad".into())
    );
    assert_eq!(AppError::from_errno(-999, "odd"), AppError::Io("odd".into()));
}

#[test]
fn toml_error_converts_to_config() {
    let err: AppError = toml::from_str::<toml::Value>("= broken")
        .unwrap_err()
        .into();
    assert!(err.to_string().starts_with("config:"));
}
