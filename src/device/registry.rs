//! Device registration: identifier assignment and name publication.
//!
//! Mirrors dynamic character-device registration: a caller asks for any
//! free major number and gets the highest unused one in
//! [`DYNAMIC_MAJOR_MIN`]`..=`[`DYNAMIC_MAJOR_MAX`]. Unregistering a device
//! that still has an open session is refused, the way a module in use cannot
//! be unloaded; a successful unregister retires the endpoint for good.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::endpoint::Endpoint;
use crate::config::DeviceConfig;
use crate::{AppError, Result};

/// Lowest major number handed out by dynamic allocation.
pub const DYNAMIC_MAJOR_MIN: u32 = 234;
/// Highest major number handed out by dynamic allocation.
pub const DYNAMIC_MAJOR_MAX: u32 = 254;

/// Identifier assigned to a device at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId {
    /// Major number, unique per registered device name.
    pub major: u32,
    /// Minor number within the major.
    pub minor: u32,
}

impl DeviceId {
    /// Build an identifier from its parts.
    #[must_use]
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// A registered device: its identifier, name, and endpoint.
#[derive(Debug, Clone)]
pub struct Registration {
    id: DeviceId,
    name: String,
    endpoint: Arc<Endpoint>,
}

impl Registration {
    /// Identifier assigned at registration.
    #[must_use]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Published device name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared endpoint for this device.
    #[must_use]
    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }
}

/// Registered name, identifier and endpoint for one major.
#[derive(Debug)]
struct MajorEntry {
    name: String,
    id: DeviceId,
    endpoint: Arc<Endpoint>,
}

/// Table of registered majors.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    majors: Mutex<BTreeMap<u32, MajorEntry>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a major number to `config.device_name` and create its endpoint.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registration` if the name is already registered or
    /// no dynamic major is free, and `AppError::Config` if the configuration
    /// is invalid.
    pub fn register(&self, config: &DeviceConfig) -> Result<Registration> {
        config.validate()?;

        let mut majors = self.lock_majors();

        if majors.values().any(|entry| entry.name == config.device_name) {
            warn!(device = %config.device_name, "registration failed: name in use");
            return Err(AppError::Registration(format!(
                "device '{}' is already registered",
                config.device_name
            )));
        }

        let Some(major) = (DYNAMIC_MAJOR_MIN..=DYNAMIC_MAJOR_MAX)
            .rev()
            .find(|major| !majors.contains_key(major))
        else {
            warn!(device = %config.device_name, "registration failed: no free major");
            return Err(AppError::Registration(
                "no free dynamic major number".into(),
            ));
        };

        let id = DeviceId::new(major, config.minor);
        let endpoint = Arc::new(Endpoint::new(
            id,
            config.device_name.clone(),
            config.length_convention,
        ));
        majors.insert(
            major,
            MajorEntry {
                name: config.device_name.clone(),
                id,
                endpoint: Arc::clone(&endpoint),
            },
        );

        info!(device = %config.device_name, major, "assigned major number");
        info!(path = %config.device_path(), "device created");

        Ok(Registration {
            id,
            name: config.device_name.clone(),
            endpoint,
        })
    }

    /// Release the major number held by `registration` and retire its
    /// endpoint, after which it can no longer be opened.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DeviceBusy` if a session is still open and
    /// `AppError::Registration` if the device is not registered here.
    pub fn unregister(&self, registration: &Registration) -> Result<()> {
        let mut majors = self.lock_majors();
        let registered = majors
            .get(&registration.id.major)
            .is_some_and(|entry| Arc::ptr_eq(&entry.endpoint, &registration.endpoint));
        if !registered {
            return Err(AppError::Registration(format!(
                "device '{}' is not registered",
                registration.name
            )));
        }

        if let Err(err) = registration.endpoint.retire() {
            warn!(device = %registration.name, %err, "unregister refused: device in use");
            return Err(err);
        }

        majors.remove(&registration.id.major);
        info!(
            device = %registration.name,
            major = registration.id.major,
            "device unregistered"
        );
        Ok(())
    }

    /// Identifier currently registered for `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<DeviceId> {
        self.lock_majors()
            .values()
            .find(|entry| entry.name == name)
            .map(|entry| entry.id)
    }

    /// Number of registered devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_majors().len()
    }

    /// Whether no device is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_majors(&self) -> MutexGuard<'_, BTreeMap<u32, MajorEntry>> {
        self.majors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
