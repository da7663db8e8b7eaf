mod common;

use std::time::Duration;

use serde_json::json;

use kiosk_flow::channel::{LinkState, Mode, PatientLookup};
use kiosk_flow::flow::Screen;
use kiosk_flow::KioskRuntime;

use common::{test_config, wait_for, Fakes, ManualTransport};

#[tokio::test(start_paused = true)]
async fn push_messages_drive_the_screens() {
    let fakes = Fakes::new(vec![]);
    let transport = ManualTransport::new();
    let push = transport.open_connection();

    let mut runtime = KioskRuntime::with_transport(
        test_config(),
        fakes.capabilities(),
        transport.clone(),
        None,
    );
    let mut snapshots = runtime.snapshots();
    let mut patients = runtime.subscribe_patients();

    let idle = wait_for(&mut snapshots, |s| {
        s.screen == Screen::Idle && s.channel.link == LinkState::Connected
    })
    .await;
    assert_eq!(idle.channel.mode, Mode::Idle);

    push.send(json!({ "type": "person_detected" }).to_string()).unwrap();
    let scanning = wait_for(&mut snapshots, |s| s.screen == Screen::QrScan).await;
    assert_eq!(scanning.channel.mode, Mode::Active);

    push.send(json!({ "type": "qr_found", "patient": { "HN": 1234, "name": "A" } }).to_string())
        .unwrap();
    let lookup = tokio::time::timeout(Duration::from_secs(5), patients.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(&lookup, PatientLookup::Found { .. }));
    assert_eq!(lookup.hn(), "1234");

    push.send("not json".to_string()).unwrap();
    push.send(json!({ "type": "reset_idle" }).to_string()).unwrap();
    wait_for(&mut snapshots, |s| s.screen == Screen::Idle).await;
    assert_eq!(runtime.modes().snapshot().mode, Mode::Idle);

    runtime.shutdown().await.unwrap();
    assert_eq!(fakes.camera.live_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn reconnect_returns_an_active_kiosk_to_idle() {
    let fakes = Fakes::new(vec![]);
    let transport = ManualTransport::new();
    let first = transport.open_connection();

    let mut runtime = KioskRuntime::with_transport(
        test_config(),
        fakes.capabilities(),
        transport.clone(),
        None,
    );
    let mut snapshots = runtime.snapshots();

    first.send(json!({ "type": "person_detected" }).to_string()).unwrap();
    let scanning = wait_for(&mut snapshots, |s| {
        s.screen == Screen::QrScan && s.channel.link == LinkState::Connected
    })
    .await;

    // no connection queued: the worker starts backing off
    drop(first);
    let offline = wait_for(&mut snapshots, |s| {
        matches!(s.channel.link, LinkState::Reconnecting { .. })
    })
    .await;
    assert_eq!(offline.screen, Screen::QrScan);
    assert_eq!(offline.session_id, scanning.session_id);
    assert!(offline.channel.is_stale());

    let _second = transport.open_connection();
    let back = wait_for(&mut snapshots, |s| {
        s.screen == Screen::Idle && s.channel.link == LinkState::Connected
    })
    .await;
    assert_eq!(back.channel.mode, Mode::Idle);
    assert!(!back.channel.is_stale());
    assert_eq!(runtime.modes().snapshot().mode, Mode::Idle);

    runtime.shutdown().await.unwrap();
    assert_eq!(fakes.camera.live_streams(), 0);
}
