//! The device endpoint: single-open exclusivity and the shared line buffer.
//!
//! An [`Endpoint`] is created once per registration and shared by `Arc`.
//! [`Endpoint::open`] hands out at most one [`Session`] at a time; all
//! buffer traffic goes through that session, so the state mutex below is
//! never contended by two callers.
//!
//! ## Protocol
//!
//! - `write` zeroes the whole buffer, then copies the caller's bytes in.
//! - `read` copies the bytes of the last write back out and zero-fills the
//!   rest of the requested length. Driver memory past the last write never
//!   leaves the endpoint.
//! - `close` releases the device and resets both counters to 1.
//!
//! Unregistration retires the endpoint: the open gate swings from closed to
//! retired in one compare-and-set, so it cannot race a concurrent open and
//! the endpoint can never be opened again.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};
use uuid::Uuid;

use super::boundary::{clear_user, copy_from_user, copy_to_user, UserDest, UserSource};
use super::registry::DeviceId;
use super::BUF_LEN;
use crate::config::LengthConvention;
use crate::{AppError, Result};

/// Open-gate value of an endpoint that has been unregistered.
const RETIRED: u32 = u32::MAX;

/// Mutable state owned by the endpoint.
struct DeviceState {
    buffer: [u8; BUF_LEN],
    /// Bytes copied in by the most recent successful write.
    valid_len: usize,
    /// Number the next write will carry.
    write_count: u64,
    /// Number the next read will carry.
    read_count: u64,
}

impl DeviceState {
    fn new() -> Self {
        Self {
            buffer: [0; BUF_LEN],
            valid_len: 0,
            write_count: 1,
            read_count: 1,
        }
    }
}

/// The single addressable device instance.
pub struct Endpoint {
    id: DeviceId,
    name: String,
    convention: LengthConvention,
    open_count: AtomicU32,
    state: Mutex<DeviceState>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("convention", &self.convention)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    /// Create a closed endpoint with a zeroed buffer and counters at 1.
    #[must_use]
    pub fn new(id: DeviceId, name: impl Into<String>, convention: LengthConvention) -> Self {
        Self {
            id,
            name: name.into(),
            convention,
            open_count: AtomicU32::new(0),
            state: Mutex::new(DeviceState::new()),
        }
    }

    /// Identifier assigned at registration.
    #[must_use]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Name the endpoint is published under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reported-count convention in effect.
    #[must_use]
    pub fn convention(&self) -> LengthConvention {
        self.convention
    }

    /// Whether a session currently holds the device.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open_count.load(Ordering::Acquire) == 1
    }

    /// Whether the endpoint has been unregistered.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.open_count.load(Ordering::Acquire) == RETIRED
    }

    /// Number the next successful write will carry.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.lock_state().write_count
    }

    /// Number the next successful read will carry.
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.lock_state().read_count
    }

    /// Claim the device for a new session.
    ///
    /// Never blocks: a busy device is rejected immediately. Counters are left
    /// as they are; only close resets them.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DeviceBusy` if another session is open and
    /// `AppError::Registration` if the endpoint has been unregistered.
    pub fn open(self: &Arc<Self>) -> Result<Session> {
        match self
            .open_count
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(RETIRED) => {
                warn!(device = %self.name, "open rejected: device unregistered");
                return Err(self.retired_error());
            }
            Err(_) => {
                warn!(device = %self.name, "open rejected: device busy");
                return Err(AppError::DeviceBusy);
            }
        }

        let session = Session {
            endpoint: Arc::clone(self),
            id: Uuid::new_v4(),
            released: false,
        };
        info!(device = %self.name, session_id = %session.id, "device opened");
        Ok(session)
    }

    /// Take the endpoint out of service if no session holds it.
    pub(crate) fn retire(&self) -> Result<()> {
        match self
            .open_count
            .compare_exchange(0, RETIRED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(RETIRED) => Err(self.retired_error()),
            Err(_) => Err(AppError::DeviceBusy),
        }
    }

    fn retired_error(&self) -> AppError {
        AppError::Registration(format!("device '{}' is no longer registered", self.name))
    }

    fn lock_state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle for one open/close interval on an [`Endpoint`].
///
/// Closing consumes the handle. Dropping it without [`Session::close`]
/// releases the device the same way.
#[derive(Debug)]
pub struct Session {
    endpoint: Arc<Endpoint>,
    id: Uuid,
    released: bool,
}

impl Session {
    /// Unique identifier of this session.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Endpoint this session holds.
    #[must_use]
    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    /// Replace the buffer contents with up to [`BUF_LEN`] bytes from `src`.
    ///
    /// Lengths beyond the buffer capacity are truncated, not rejected.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidAddress` if `src` cannot supply the bytes.
    /// The buffer is left zeroed in that case.
    pub fn write(&mut self, src: &UserSource<'_>, requested_len: usize) -> Result<usize> {
        let endpoint = &self.endpoint;
        let mut state = endpoint.lock_state();

        state.buffer.fill(0);
        state.valid_len = 0;

        let len = requested_len.min(BUF_LEN);
        let copied = copy_from_user(&mut state.buffer[..len], src, len).map_err(|fault| {
            warn!(device = %endpoint.name, %fault, "write faulted");
            AppError::from(fault)
        })?;
        state.valid_len = copied;

        let count = endpoint.convention.reported_count(&state.buffer[..copied]);
        info!(
            device = %endpoint.name,
            count,
            write_number = state.write_count,
            "letters received from user application"
        );
        state.write_count += 1;

        Ok(count)
    }

    /// Copy the current buffer contents to the start of `dst`.
    ///
    /// `min(requested_len, BUF_LEN)` bytes of `dst` are written: the bytes of
    /// the last write followed by zero padding.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidAddress` if `dst` cannot take those bytes.
    /// Nothing is written to `dst` in that case.
    pub fn read(&mut self, dst: &mut UserDest<'_>, requested_len: usize) -> Result<usize> {
        let endpoint = &self.endpoint;
        let mut state = endpoint.lock_state();

        let len = requested_len.min(BUF_LEN);
        let content = len.min(state.valid_len);

        let transferred = dst
            .access_ok(0, len)
            .and_then(|()| copy_to_user(dst, &state.buffer[..content]))
            .and_then(|copied| clear_user(dst, copied, len - copied))
            .map_err(|fault| {
                warn!(device = %endpoint.name, %fault, "read faulted");
                AppError::from(fault)
            })?;
        debug_assert_eq!(content + transferred, len);

        let count = endpoint.convention.reported_count(&state.buffer[..content]);
        info!(
            device = %endpoint.name,
            count,
            read_number = state.read_count,
            "letters sent to user application"
        );
        state.read_count += 1;

        Ok(count)
    }

    /// Release the device.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        {
            let mut state = self.endpoint.lock_state();
            state.write_count = 1;
            state.read_count = 1;
        }
        self.endpoint.open_count.store(0, Ordering::Release);
        info!(device = %self.endpoint.name, session_id = %self.id, "device released");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
