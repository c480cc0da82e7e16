//! Unit tests for device registration and major number assignment.

use chardev::device::registry::{DYNAMIC_MAJOR_MAX, DYNAMIC_MAJOR_MIN};
use chardev::device::DeviceRegistry;
use chardev::{AppError, DeviceConfig};

fn config(name: &str) -> DeviceConfig {
    DeviceConfig {
        device_name: name.into(),
        ..DeviceConfig::default()
    }
}

#[test]
fn first_registration_gets_highest_dynamic_major() {
    let registry = DeviceRegistry::new();
    let registration = registry.register(&config("chardev")).expect("register");

    assert_eq!(registration.id().major, DYNAMIC_MAJOR_MAX);
    assert_eq!(registration.id().minor, 0);
    assert_eq!(registration.name(), "chardev");
    assert_eq!(registration.endpoint().id(), registration.id());
    assert!(!registration.endpoint().is_open());
}

#[test]
fn majors_are_assigned_downwards() {
    let registry = DeviceRegistry::new();
    let a = registry.register(&config("a")).unwrap();
    let b = registry.register(&config("b")).unwrap();
    assert_eq!(b.id().major, a.id().major - 1);
    assert_eq!(registry.len(), 2);
}

#[test]
fn duplicate_name_is_rejected() {
    let registry = DeviceRegistry::new();
    registry.register(&config("chardev")).unwrap();
    let err = registry.register(&config("chardev")).unwrap_err();
    assert!(matches!(err, AppError::Registration(_)));
}

#[test]
fn exhausting_dynamic_majors_fails_registration() {
    let registry = DeviceRegistry::new();
    let available = DYNAMIC_MAJOR_MAX - DYNAMIC_MAJOR_MIN + 1;
    for i in 0..available {
        registry.register(&config(&format!("dev{i}"))).unwrap();
    }
    let err = registry.register(&config("one-too-many")).unwrap_err();
    assert!(matches!(err, AppError::Registration(_)));
}

#[test]
fn unregister_frees_major_for_reuse() {
    let registry = DeviceRegistry::new();
    let registration = registry.register(&config("chardev")).unwrap();
    let major = registration.id().major;

    registry.unregister(&registration).expect("unregister");
    assert!(registry.is_empty());
    assert_eq!(registry.lookup("chardev"), None);

    let again = registry.register(&config("chardev")).unwrap();
    assert_eq!(again.id().major, major);
}

#[test]
fn unregister_refused_while_device_open() {
    let registry = DeviceRegistry::new();
    let registration = registry.register(&config("chardev")).unwrap();
    let session = registration.endpoint().open().unwrap();

    assert_eq!(registry.unregister(&registration).unwrap_err(), AppError::DeviceBusy);
    session.close();
    registry.unregister(&registration).expect("unregister after close");
}

#[test]
fn unregister_twice_is_an_error() {
    let registry = DeviceRegistry::new();
    let registration = registry.register(&config("chardev")).unwrap();
    registry.unregister(&registration).unwrap();
    let err = registry.unregister(&registration).unwrap_err();
    assert!(matches!(err, AppError::Registration(_)));
}

#[test]
fn lookup_returns_configured_minor() {
    let registry = DeviceRegistry::new();
    let registration = registry
        .register(&DeviceConfig {
            device_name: "chardev".into(),
            minor: 7,
            ..DeviceConfig::default()
        })
        .unwrap();
    assert_eq!(registry.lookup("chardev"), Some(registration.id()));
    assert_eq!(registration.id().to_string(), format!("{DYNAMIC_MAJOR_MAX}:7"));
}

#[test]
fn invalid_config_is_rejected_before_assignment() {
    let registry = DeviceRegistry::new();
    let err = registry.register(&config("")).unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
    assert!(registry.is_empty());
}

#[test]
fn unregistered_endpoint_can_no_longer_be_opened() {
    let registry = DeviceRegistry::new();
    let registration = registry.register(&config("chardev")).unwrap();
    let endpoint = registration.endpoint().clone();

    registry.unregister(&registration).unwrap();
    assert!(endpoint.is_retired());
    let err = endpoint.open().unwrap_err();
    assert!(matches!(err, AppError::Registration(_)));
    assert!(!endpoint.is_open());
}

#[test]
fn reregistered_name_keeps_a_single_open_endpoint() {
    let registry = DeviceRegistry::new();
    let old = registry.register(&config("chardev")).unwrap();
    registry.unregister(&old).unwrap();
    let new = registry.register(&config("chardev")).unwrap();

    let _session = new.endpoint().open().expect("new endpoint opens");
    assert!(old.endpoint().open().is_err());
    assert!(!old.endpoint().is_open());
}

#[test]
fn stale_registration_cannot_unregister_its_successor() {
    let registry = DeviceRegistry::new();
    let old = registry.register(&config("chardev")).unwrap();
    registry.unregister(&old).unwrap();
    let new = registry.register(&config("chardev")).unwrap();
    assert_eq!(new.id(), old.id());

    let err = registry.unregister(&old).unwrap_err();
    assert!(matches!(err, AppError::Registration(_)));
    assert_eq!(registry.lookup("chardev"), Some(new.id()));
    assert!(!new.endpoint().is_retired());
}

#[test]
fn racing_open_and_unregister_never_leave_both_succeeding() {
    use std::sync::{Arc, Barrier};
    use std::thread;

    for _ in 0..64 {
        let registry = Arc::new(DeviceRegistry::new());
        let registration = registry.register(&config("chardev")).unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let opener = {
            let endpoint = registration.endpoint().clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                endpoint.open()
            })
        };
        barrier.wait();
        let unregistered = registry.unregister(&registration);
        let opened = opener.join().expect("opener joins");

        assert!(
            opened.is_ok() != unregistered.is_ok(),
            "exactly one of open and unregister wins"
        );
    }
}
