//! Integration tests for blediag-core against the mock transport.
//!
//! These exercise the public session API end to end: guard, resolver,
//! operations, poll scheduler and CSV export.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use blediag_core::uuids::{FFE0_SERVICE, FFE1_CHARACTERISTIC, FFE3_CHARACTERISTIC};
use blediag_core::{
    Capabilities, CharacteristicInfo, ConnectionSession, Error, MockTransport, PollScheduler,
    RetryConfig, SubscribeOutcome, Terminator, WriteMode, WritePrimitive,
};
use blediag_types::{CharacteristicRef, Format};

fn ffe1() -> CharacteristicRef {
    CharacteristicRef::new(FFE0_SERVICE, FFE1_CHARACTERISTIC)
}

fn ffe3() -> CharacteristicRef {
    CharacteristicRef::new(FFE0_SERVICE, FFE3_CHARACTERISTIC)
}

fn session(mock: &Arc<MockTransport>) -> Arc<ConnectionSession> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Arc::new(ConnectionSession::new(mock.clone()))
}

#[tokio::test]
async fn test_read_decodes_every_slot() {
    let mock = Arc::new(MockTransport::serial_module());
    mock.set_value(&ffe1(), vec![0x01, 0x00, 0x02, 0x00, 0x03]);
    let session = session(&mock);

    let sample = session.read(&ffe1(), Format::Uint16Le).await.unwrap();
    assert_eq!(sample.value, "1 2");
    assert_eq!(sample.raw_hex, "01 00 02 00 03");
    assert!(sample.adc.is_none());

    // Reads are returned, not recorded.
    assert!(session.series().is_empty().await);
}

#[tokio::test]
async fn test_read_adc_characteristic() {
    let mock = Arc::new(MockTransport::serial_module());
    mock.set_value(&ffe3(), vec![0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04, 0x00]);
    let session = session(&mock);

    let sample = session.read(&ffe3(), Format::Auto).await.unwrap();
    assert_eq!(sample.value, "01 00 02 00 03 00 04 00");
    let raw: Vec<u16> = sample.adc.unwrap().iter().map(|c| c.raw).collect();
    assert_eq!(raw, vec![256, 512, 768, 1024]);
}

#[tokio::test(start_paused = true)]
async fn test_read_reconnects_dropped_link() {
    let mock = Arc::new(MockTransport::serial_module());
    mock.set_value(&ffe1(), vec![0x01]);
    let session = session(&mock);

    mock.drop_link();
    let sample = session.read(&ffe1(), Format::Auto).await.unwrap();
    assert_eq!(sample.value, "1");
    assert_eq!(mock.connect_count(), 1);
}

#[tokio::test]
async fn test_write_appends_crlf() {
    let mock = Arc::new(MockTransport::serial_module());
    let session = session(&mock);

    let report = session
        .write(&ffe1(), Format::Hex, "41", WriteMode::Auto, Terminator::CrLf)
        .await
        .unwrap();

    assert_eq!(report.bytes.as_ref(), &[0x41, 0x0d, 0x0a]);
    assert_eq!(report.primitive, WritePrimitive::WithResponse);
    let writes = mock.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].data, vec![0x41, 0x0d, 0x0a]);
}

#[tokio::test]
async fn test_write_invalid_input_never_reaches_link() {
    let mock = Arc::new(MockTransport::serial_module());
    let session = session(&mock);

    let result = session
        .write(&ffe1(), Format::Bits, "101", WriteMode::Auto, Terminator::None)
        .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));

    let result = session
        .write(&ffe1(), Format::Auto, "1", WriteMode::Auto, Terminator::None)
        .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert!(mock.writes().is_empty());
}

#[tokio::test]
async fn test_write_mode_selection() {
    let mock = Arc::new(MockTransport::serial_module());
    let session = session(&mock);

    let report = session
        .write(
            &ffe1(),
            Format::Uint8,
            "7",
            WriteMode::WithoutResponse,
            Terminator::None,
        )
        .await
        .unwrap();
    assert_eq!(report.primitive, WritePrimitive::WithoutResponse);

    // 0xFFE3 is read/notify only.
    let result = session
        .write(&ffe3(), Format::Uint8, "7", WriteMode::WithResponse, Terminator::None)
        .await;
    assert!(matches!(result, Err(Error::UnsupportedOperation { .. })));

    // Auto falls back to the generic primitive.
    let report = session
        .write(&ffe3(), Format::Uint8, "7", WriteMode::Auto, Terminator::None)
        .await
        .unwrap();
    assert_eq!(report.primitive, WritePrimitive::Generic);
}

#[tokio::test]
async fn test_write_without_any_primitive() {
    let mock = Arc::new(
        MockTransport::builder()
            .generic_write(false)
            .characteristic(CharacteristicInfo {
                service: FFE0_SERVICE,
                uuid: FFE1_CHARACTERISTIC,
                capabilities: Capabilities::READ,
            })
            .build(),
    );
    let session = session(&mock);

    let result = session
        .write(&ffe1(), Format::Utf8, "hi", WriteMode::Auto, Terminator::Lf)
        .await;
    assert!(matches!(result, Err(Error::UnsupportedOperation { .. })));
}

#[tokio::test]
async fn test_subscribe_streams_decoded_samples() {
    let mock = Arc::new(MockTransport::serial_module());
    let session = session(&mock);

    let SubscribeOutcome::Started(mut stream) =
        session.subscribe(&ffe1(), Format::Utf8).await.unwrap()
    else {
        panic!("expected a new subscription");
    };

    mock.notify(&ffe1(), b"ok".to_vec());
    let sample = stream.next().await.unwrap();
    assert_eq!(sample.value, "ok");
    assert_eq!(sample.raw_hex, "6f 6b");
}

#[tokio::test]
async fn test_resubscribe_same_target_is_noop() {
    let mock = Arc::new(MockTransport::serial_module());
    let session = session(&mock);

    let first = session.subscribe(&ffe1(), Format::Hex).await.unwrap();
    assert!(matches!(first, SubscribeOutcome::Started(_)));
    let second = session.subscribe(&ffe1(), Format::Hex).await.unwrap();
    assert!(matches!(second, SubscribeOutcome::AlreadyActive));
    assert_eq!(mock.subscribe_count(), 1);
}

#[tokio::test]
async fn test_subscribe_new_target_tears_down_previous() {
    let mock = Arc::new(MockTransport::serial_module());
    let session = session(&mock);

    let SubscribeOutcome::Started(mut first) =
        session.subscribe(&ffe1(), Format::Hex).await.unwrap()
    else {
        panic!("expected a new subscription");
    };
    session.subscribe(&ffe3(), Format::Hex).await.unwrap();

    assert_eq!(mock.unsubscribe_count(), 1);
    assert_eq!(session.active_subscription().await, Some(ffe3()));
    assert!(first.next().await.is_none());
}

#[tokio::test]
async fn test_subscribe_without_notify_keeps_previous() {
    let mock = Arc::new(MockTransport::serial_module());
    let read_only = CharacteristicRef::parse("0xffe0", "0xffe2").unwrap();
    mock.add_characteristic(CharacteristicInfo {
        service: FFE0_SERVICE,
        uuid: read_only.characteristic,
        capabilities: Capabilities::READ,
    });
    let session = session(&mock);

    session.subscribe(&ffe1(), Format::Hex).await.unwrap();
    let result = session.subscribe(&read_only, Format::Hex).await;

    assert!(matches!(result, Err(Error::UnsupportedOperation { .. })));
    assert_eq!(session.active_subscription().await, Some(ffe1()));
    assert_eq!(mock.unsubscribe_count(), 0);
}

#[tokio::test]
async fn test_unsubscribe() {
    let mock = Arc::new(MockTransport::serial_module());
    let session = session(&mock);

    // Nothing to do yet.
    session.unsubscribe().await.unwrap();
    assert_eq!(mock.unsubscribe_count(), 0);

    session.subscribe(&ffe1(), Format::Hex).await.unwrap();
    session.unsubscribe().await.unwrap();
    assert_eq!(mock.unsubscribe_count(), 1);
    assert_eq!(session.active_subscription().await, None);
    assert_eq!(mock.notify(&ffe1(), vec![1]), 0);
}

#[tokio::test]
async fn test_describe_services_lists_capabilities() {
    let mock = Arc::new(MockTransport::serial_module());
    let session = session(&mock);

    let descriptions = session
        .describe_services(&RetryConfig::for_discovery())
        .await
        .unwrap();
    assert_eq!(descriptions.len(), 1);
    assert_eq!(descriptions[0].characteristics.len(), 2);
    assert!(descriptions[0].to_string().contains("[READ, NOTIFY]"));
}

#[tokio::test(start_paused = true)]
async fn test_poll_then_export_csv() {
    let mock = Arc::new(MockTransport::serial_module());
    mock.set_value(&ffe3(), vec![0x0f, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    let session = session(&mock);
    let poll = PollScheduler::new(session.clone(), ffe3());

    poll.start(Duration::from_secs(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    poll.stop().await;

    let csv = session.series().to_csv().await;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "timestamp,value,hex,ADC_CH1,ADC_CH2,ADC_CH3,ADC_CH4");
    assert_eq!(lines.len(), 3);
    assert!(lines[1].ends_with(",\"0f ff 00 00 00 00 00 00\",0f ff 00 00 00 00 00 00,3.300,0.000,0.000,0.000"));
}

#[tokio::test(start_paused = true)]
async fn test_clear_drops_in_flight_poll_sample() {
    let mock = Arc::new(MockTransport::serial_module());
    mock.set_value(&ffe1(), vec![0x09]);
    mock.set_read_latency(Duration::from_millis(300));
    let session = session(&mock);
    let poll = PollScheduler::new(session.clone(), ffe1());

    poll.start(Duration::from_secs(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.series().clear().await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    poll.stop().await;

    assert!(session.series().is_empty().await);
    assert_eq!(poll.state().await.invocation_count, 1);
}
