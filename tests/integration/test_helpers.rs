//! Shared helpers for tests that run a real device host.

use chardev::device::{DeviceRegistry, Registration};
use chardev::ipc::server::spawn_device_server;
use chardev::DeviceConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A registered device served on a unique socket name.
pub struct TestHost {
    pub registry: DeviceRegistry,
    pub registration: Registration,
    pub ct: CancellationToken,
    pub handle: JoinHandle<()>,
}

impl TestHost {
    /// Register a device under a fresh name and start serving it.
    pub fn start() -> Self {
        let config = DeviceConfig {
            device_name: format!("chardev-test-{}", uuid::Uuid::new_v4().simple()),
            ..DeviceConfig::default()
        };
        let registry = DeviceRegistry::new();
        let registration = registry.register(&config).expect("register test device");
        let ct = CancellationToken::new();
        let handle = spawn_device_server(registration.endpoint().clone(), ct.clone())
            .expect("publish test device");
        Self {
            registry,
            registration,
            ct,
            handle,
        }
    }

    /// Published device name.
    pub fn name(&self) -> String {
        self.registration.name().to_owned()
    }

    /// Stop serving and wait for the accept loop to exit.
    pub async fn stop(self) {
        self.ct.cancel();
        self.handle.await.expect("server task joins");
    }
}
