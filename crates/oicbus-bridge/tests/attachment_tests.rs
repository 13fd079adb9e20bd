//! Attachment lifecycle tests

use oicbus_bridge::{
    AttachmentConfig, AttachmentState, BridgeAttachment, BridgeError, BridgeEvent, BusConnection,
    BusError, InterfaceDescription, Payload, RecordKind, VirtualObject,
};
use oicbus_core::ResourceRecord;
use oicbus_test_utils::{drain_events, BusCall, FailStep, MockBus, RecordingObserver};
use std::sync::{Arc, Barrier};
use std::thread;
use tokio::sync::mpsc;

const DEVICE_ID: &str = "0ce43c8b-b997-4a05-b77d-1c92e01fe7ae";

fn create(bus: &Arc<MockBus>) -> BridgeAttachment {
    BridgeAttachment::create(AttachmentConfig::new(DEVICE_ID), bus.clone(), None).unwrap()
}

fn register(attachment: &BridgeAttachment, uri: &str, observer: &Arc<RecordingObserver>) {
    attachment
        .register_object(VirtualObject::new(uri, vec!["oic.r.switch.binary".into()], observer.clone()))
        .unwrap();
}

#[test]
fn test_create_binds_session_port() {
    let bus = Arc::new(MockBus::new());
    let attachment = create(&bus);
    assert_eq!(attachment.state(), AttachmentState::Connected);
    assert_eq!(
        bus.calls(),
        vec![BusCall::Start, BusCall::Connect, BusCall::BindSessionPort(900)]
    );
}

#[test]
fn test_construction_failure_tears_down() {
    for step in [FailStep::Start, FailStep::Connect, FailStep::BindSessionPort] {
        let bus = Arc::new(MockBus::new().failing(step));
        let err = BridgeAttachment::create(AttachmentConfig::new(DEVICE_ID), bus.clone(), None)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Construction { .. }), "{:?}", step);
        assert_eq!(bus.count(&BusCall::Disconnect), 1);
        assert!(!bus.calls().iter().any(|c| matches!(c, BusCall::Announce(_))));
    }
}

#[test]
fn test_failed_registration_not_added() {
    let bus = Arc::new(MockBus::new());
    let attachment = create(&bus);
    bus.fail(FailStep::RegisterObject);
    let observer = Arc::new(RecordingObserver::new());
    let result = attachment.register_object(VirtualObject::new("/a/light", vec![], observer));
    assert!(matches!(result, Err(BridgeError::Bus(_))));
    assert!(attachment.object_paths().is_empty());
}

#[test]
fn test_registration_order_preserved() {
    let bus = Arc::new(MockBus::new());
    let attachment = create(&bus);
    let observer = Arc::new(RecordingObserver::new());
    for uri in ["/c", "/a", "/b"] {
        register(&attachment, uri, &observer);
    }
    assert_eq!(attachment.object_paths(), vec!["/c", "/a", "/b"]);
}

#[test]
fn test_session_lifecycle() {
    let bus = Arc::new(MockBus::new());
    let attachment = create(&bus);
    let observer = Arc::new(RecordingObserver::new());
    register(&attachment, "/a/light", &observer);
    register(&attachment, "/a/fan", &observer);

    assert!(attachment.accept_join(900, ":1.7"));

    attachment.session_joined(1);
    assert_eq!(observer.observed("/a/light"), 1);
    assert_eq!(observer.observed("/a/fan"), 1);
    assert!(attachment.object("/a/light").unwrap().is_observing());

    attachment.session_joined(2);
    assert_eq!(attachment.sessions(), 2);
    assert_eq!(observer.observed("/a/light"), 1);

    attachment.session_lost(2);
    assert_eq!(observer.cancelled("/a/light"), 0);

    attachment.session_lost(1);
    assert_eq!(attachment.sessions(), 0);
    assert_eq!(observer.cancelled("/a/light"), 1);
    assert_eq!(observer.cancelled("/a/fan"), 1);
    assert_eq!(observer.total_calls(), 4);

    attachment.session_joined(3);
    assert_eq!(observer.observed("/a/light"), 2);
}

#[test]
fn test_observe_failure_does_not_block_other_objects() {
    let bus = Arc::new(MockBus::new());
    let attachment = create(&bus);
    let failing = Arc::new(RecordingObserver::new());
    failing.fail_observe();
    let healthy = Arc::new(RecordingObserver::new());
    register(&attachment, "/a/broken", &failing);
    register(&attachment, "/a/light", &healthy);

    attachment.session_joined(1);
    assert_eq!(attachment.sessions(), 1);
    assert_eq!(healthy.observed("/a/light"), 1);
    assert!(!attachment.object("/a/broken").unwrap().is_observing());
}

#[test]
fn test_announce_publishes_valid_record() {
    let bus = Arc::new(MockBus::new());
    let attachment = create(&bus);
    attachment
        .update_announcement(
            RecordKind::Device,
            &ResourceRecord::new()
                .with("n", "Light")
                .with("dmno", "model-1")
                .with("x.org.example.colour", "red"),
        )
        .unwrap();
    attachment.announce().unwrap();

    assert_eq!(attachment.state(), AttachmentState::Announced);
    assert!(attachment.is_announced());
    let published = bus.announcements();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].model_number(), Some("model-1"));
    assert!(published[0].check_compatible().is_ok());
}

#[test]
fn test_announce_twice_publishes_twice() {
    let bus = Arc::new(MockBus::new());
    let attachment = create(&bus);
    attachment.announce().unwrap();
    attachment.announce().unwrap();
    assert_eq!(bus.count(&BusCall::Announce(900)), 2);
}

#[test]
fn test_announce_failure_propagates() {
    let bus = Arc::new(MockBus::new().failing(FailStep::Announce));
    let attachment = create(&bus);
    assert!(matches!(attachment.announce(), Err(BridgeError::Bus(_))));
    assert_eq!(attachment.state(), AttachmentState::Connected);
}

#[test]
fn test_create_interface_from_representation() {
    let bus = Arc::new(MockBus::new());
    let attachment = create(&bus);
    let rep = ResourceRecord::new().with("value", true).with("brightness", 20i64);
    let iface = attachment
        .create_interface("oic.r.light", &Payload::Representation(rep))
        .unwrap()
        .unwrap();
    assert_eq!(iface.properties.len(), 2);
    assert_eq!(bus.interface("oic.r.light"), Some(iface));
}

#[test]
fn test_create_interface_already_exists_returns_existing() {
    let bus = Arc::new(MockBus::new());
    let existing = InterfaceDescription::new("oic.r.light");
    bus.define_interface(existing.clone());
    let attachment = create(&bus);
    let rep = ResourceRecord::new().with("value", true);
    let iface = attachment
        .create_interface("oic.r.light", &Payload::Representation(rep))
        .unwrap();
    assert_eq!(iface, Some(existing));
}

#[test]
fn test_create_interface_ignores_non_representation() {
    let bus = Arc::new(MockBus::new());
    let attachment = create(&bus);
    assert_eq!(
        attachment.create_interface("oic.r.light", &Payload::Discovery).unwrap(),
        None
    );
    assert_eq!(bus.count(&BusCall::CreateInterface("oic.r.light".into())), 0);

    let device_type = attachment
        .create_interface("oic.d.light", &Payload::Presence)
        .unwrap()
        .unwrap();
    assert!(device_type.properties.is_empty());
}

#[test]
fn test_create_interface_bus_failure() {
    let bus = Arc::new(MockBus::new().failing(FailStep::CreateInterface));
    let attachment = create(&bus);
    let rep = ResourceRecord::new().with("value", true);
    let err = attachment
        .create_interface("oic.r.light", &Payload::Representation(rep))
        .unwrap_err();
    assert!(matches!(err, BridgeError::Bus(BusError::Failed(_))));
}

#[test]
fn test_destroy_releases_everything() {
    let bus = Arc::new(MockBus::new());
    let attachment = create(&bus);
    let observer = Arc::new(RecordingObserver::new());
    register(&attachment, "/a/light", &observer);
    attachment.announce().unwrap();

    attachment.destroy();
    assert_eq!(bus.count(&BusCall::Unannounce), 1);
    assert_eq!(bus.count(&BusCall::UnregisterObject("/a/light".into())), 1);
    assert_eq!(bus.count(&BusCall::Disconnect), 1);

    attachment.destroy();
    drop(attachment);
    assert_eq!(bus.count(&BusCall::Disconnect), 1);
}

#[test]
fn test_drop_destroys() {
    let bus = Arc::new(MockBus::new());
    {
        let _attachment = create(&bus);
    }
    assert_eq!(bus.count(&BusCall::Disconnect), 1);
}

#[test]
fn test_create_interface_translates_names() {
    let bus = Arc::new(MockBus::new());
    let attachment = create(&bus);
    let rep = ResourceRecord::new().with("on-off", true);
    let iface = attachment
        .create_interface("x.org.example.my-light", &Payload::Representation(rep))
        .unwrap()
        .unwrap();

    assert_eq!(iface.name, "org.example.my_light");
    assert_eq!(iface.property("on_off").unwrap().signature, "b");
    assert_eq!(bus.count(&BusCall::CreateInterface("org.example.my_light".into())), 1);
    assert!(bus.interface("x.org.example.my-light").is_none());
}

#[test]
fn test_create_interface_rejects_invalid_bus_name() {
    let bus = Arc::new(MockBus::new());
    let attachment = create(&bus);
    let rep = ResourceRecord::new().with("value", true);
    let err = attachment
        .create_interface("x.light", &Payload::Representation(rep))
        .unwrap_err();
    assert!(matches!(err, BridgeError::Translation(_)));
    assert!(!bus.calls().iter().any(|c| matches!(c, BusCall::CreateInterface(_))));
}

#[test]
fn test_registered_object_carries_interface_properties() {
    let bus = Arc::new(MockBus::new());
    let attachment = create(&bus);
    let observer = Arc::new(RecordingObserver::new());
    let rep = ResourceRecord::new().with("on-off", true).with("level", 3i64);
    let iface = attachment
        .create_interface("x.org.example.my-light", &Payload::Representation(rep))
        .unwrap()
        .unwrap();
    attachment
        .register_object(VirtualObject::new("/a/light", vec![], observer).with_interface(&iface))
        .unwrap();

    let object = attachment.object("/a/light").unwrap();
    assert_eq!(object.interfaces(), ["org.example.my_light"]);
    assert_eq!(object.property_signature("on_off"), Some("b"));
    assert_eq!(object.property_signature("level"), Some("i"));
}

#[test]
fn test_register_object_rejects_invalid_interface() {
    let bus = Arc::new(MockBus::new());
    let attachment = create(&bus);
    let observer = Arc::new(RecordingObserver::new());
    let result = attachment.register_object(VirtualObject::new(
        "/a/light",
        vec!["x.light".into()],
        observer,
    ));
    assert!(matches!(result, Err(BridgeError::Translation(_))));
    assert_eq!(bus.count(&BusCall::RegisterObject("/a/light".into())), 0);
    assert!(attachment.object_paths().is_empty());
}

#[test]
fn test_unregister_object() {
    let bus = Arc::new(MockBus::new());
    let attachment = create(&bus);
    let observer = Arc::new(RecordingObserver::new());
    register(&attachment, "/a/light", &observer);
    register(&attachment, "/a/fan", &observer);
    attachment.session_joined(1);

    attachment.unregister_object("/a/light").unwrap();
    assert_eq!(observer.cancelled("/a/light"), 1);
    assert_eq!(observer.cancelled("/a/fan"), 0);
    assert_eq!(bus.count(&BusCall::UnregisterObject("/a/light".into())), 1);
    assert_eq!(attachment.object_paths(), vec!["/a/fan"]);

    let err = attachment.unregister_object("/a/light").unwrap_err();
    assert!(matches!(err, BridgeError::ObjectNotFound(path) if path == "/a/light"));
}

#[test]
fn test_observe_failure_reported_as_event() {
    let bus = Arc::new(MockBus::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let attachment =
        BridgeAttachment::create(AttachmentConfig::new(DEVICE_ID), bus, Some(tx)).unwrap();
    let failing = Arc::new(RecordingObserver::new());
    failing.fail_observe();
    register(&attachment, "/a/broken", &failing);

    attachment.session_joined(1);
    let events = drain_events(&mut rx);
    let errors: Vec<&BridgeEvent> = events
        .iter()
        .filter(|e| matches!(e, BridgeEvent::Error(_)))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], BridgeEvent::Error(msg) if msg.contains("/a/broken")));
}

#[test]
fn test_construction_failure_reported_as_event() {
    let bus = Arc::new(MockBus::new().failing(FailStep::Connect));
    let (tx, mut rx) = mpsc::unbounded_channel();
    assert!(BridgeAttachment::create(AttachmentConfig::new(DEVICE_ID), bus, Some(tx)).is_err());
    let events = drain_events(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], BridgeEvent::Error(msg) if msg.contains("connect")));
}

#[test]
fn test_concurrent_sessions_observe_once() {
    const THREADS: usize = 8;
    let bus = Arc::new(MockBus::new());
    let attachment = Arc::new(create(&bus));
    let observer = Arc::new(RecordingObserver::new());
    register(&attachment, "/a/light", &observer);
    register(&attachment, "/a/fan", &observer);

    let barrier = Arc::new(Barrier::new(THREADS));
    let joins: Vec<_> = (0..THREADS)
        .map(|i| {
            let attachment = attachment.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                attachment.session_joined(i as u32);
            })
        })
        .collect();
    for handle in joins {
        handle.join().unwrap();
    }
    assert_eq!(attachment.sessions(), THREADS);

    let losses: Vec<_> = (0..THREADS)
        .map(|i| {
            let attachment = attachment.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                attachment.session_lost(i as u32);
            })
        })
        .collect();
    for handle in losses {
        handle.join().unwrap();
    }

    assert_eq!(attachment.sessions(), 0);
    for uri in ["/a/light", "/a/fan"] {
        assert_eq!(observer.observed(uri), 1, "{}", uri);
        assert_eq!(observer.cancelled(uri), 1, "{}", uri);
    }
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "session lost without a joined session")]
fn test_session_lost_at_zero_panics_in_debug() {
    let bus = Arc::new(MockBus::new());
    let attachment = create(&bus);
    attachment.session_lost(1);
}
