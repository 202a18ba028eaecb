//! Hardware integration tests for blediag-core
//!
//! These tests require actual BLE hardware and should be run with:
//! ```text
//! cargo test --package blediag-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Configure the peripheral via environment variables:
//! - `BLEDIAG_DEVICE`: name, address or peripheral ID (default: `HMSoft`)
//! - `BLEDIAG_SERVICE` / `BLEDIAG_CHARACTERISTIC`: target (default: `0xffe0` / `0xffe1`)

use std::env;
use std::sync::Arc;
use std::time::Duration;

use blediag_core::scan::scan_with_options;
use blediag_core::{
    BleTransport, ConnectionConfig, ConnectionSession, PollScheduler, RetryConfig, ScanOptions,
    Transport,
};
use blediag_types::{CharacteristicRef, Format};
use tokio::time::timeout;

/// Default timeout for BLE operations
const BLE_TIMEOUT: Duration = Duration::from_secs(30);

fn device() -> String {
    env::var("BLEDIAG_DEVICE").unwrap_or_else(|_| "HMSoft".to_string())
}

fn target() -> CharacteristicRef {
    let service = env::var("BLEDIAG_SERVICE").unwrap_or_else(|_| "0xffe0".to_string());
    let characteristic =
        env::var("BLEDIAG_CHARACTERISTIC").unwrap_or_else(|_| "0xffe1".to_string());
    CharacteristicRef::parse(&service, &characteristic).expect("valid target UUIDs")
}

async fn connect() -> Arc<ConnectionSession> {
    let transport = timeout(
        BLE_TIMEOUT,
        BleTransport::connect_to(&device(), &ScanOptions::default(), ConnectionConfig::default()),
    )
    .await
    .expect("connect timed out")
    .expect("connect failed");
    Arc::new(ConnectionSession::new(Arc::new(transport)))
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_discovers_devices() {
    let options = ScanOptions::default().duration_secs(10);
    let devices = timeout(BLE_TIMEOUT, scan_with_options(options))
        .await
        .expect("scan timed out")
        .expect("scan failed");

    println!("Found {} devices", devices.len());
    for device in devices {
        println!(
            "  {} ({}) {:?}",
            device.name.as_deref().unwrap_or("Unknown"),
            device.identifier,
            device.rssi
        );
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_describe_services() {
    let session = connect().await;
    let descriptions = session
        .describe_services(&RetryConfig::for_discovery())
        .await
        .expect("discovery failed");
    assert!(!descriptions.is_empty());
    for description in descriptions {
        print!("{}", description);
    }
    session.transport().disconnect().await.ok();
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_read_and_reconnect() {
    let session = connect().await;
    let sample = session.read(&target(), Format::Hex).await.expect("read failed");
    println!("Read: {}", sample.value);

    session.transport().disconnect().await.expect("disconnect failed");
    let sample = session
        .read(&target(), Format::Hex)
        .await
        .expect("read after reconnect failed");
    println!("Read after reconnect: {}", sample.value);
    session.transport().disconnect().await.ok();
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_poll_for_a_few_seconds() {
    let session = connect().await;
    let poll = PollScheduler::new(session.clone(), target());
    poll.start(Duration::from_secs(1)).await.expect("start failed");
    tokio::time::sleep(Duration::from_secs(5)).await;
    poll.stop().await;

    let state = poll.state().await;
    println!("{} ticks, {} samples", state.invocation_count, session.series().len().await);
    assert!(state.invocation_count >= 4);
    print!("{}", session.series().to_csv().await);
    session.unsubscribe().await.ok();
    session.transport().disconnect().await.ok();
}
