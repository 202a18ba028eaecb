//! Core BLE diagnostic library.
//!
//! This crate drives a single GATT peripheral for inspection: it discovers
//! services, reads, writes and subscribes to characteristic values, and
//! polls a characteristic into an in-memory sample series for export.
//!
//! # Features
//!
//! - **Device discovery**: scan for peripherals by name, address or advertised service
//! - **Connection guard**: every operation reconnects a dropped link first
//! - **Resilient discovery**: service resolution retries and reconnects between attempts
//! - **Value codec**: values decoded and encoded in 17 formats, see [`blediag_types::codec`]
//! - **Write-mode selection**: with response, without response, or generic
//! - **Notifications**: one subscription per session, streamed as decoded samples
//! - **Polling**: a single repeating timer that falls back to notifications
//! - **CSV export**: `timestamp,value,hex,ADC_CH1..4`
//!
//! # Platform Differences
//!
//! On macOS peripherals are identified by a CoreBluetooth UUID, which is
//! stable per Mac but not the MAC address. On Linux and Windows the
//! Bluetooth address is used.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use blediag_core::{BleTransport, ConnectionConfig, ConnectionSession, PollScheduler, ScanOptions};
//! use blediag_types::{CharacteristicRef, Format};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = BleTransport::connect_to(
//!         "HMSoft",
//!         &ScanOptions::default(),
//!         ConnectionConfig::default(),
//!     )
//!     .await?;
//!     let session = Arc::new(ConnectionSession::new(Arc::new(transport)));
//!
//!     let target = CharacteristicRef::parse("0xffe0", "0xffe1")?;
//!     let sample = session.read(&target, Format::Hex).await?;
//!     println!("{}", sample.value);
//!
//!     let poll = PollScheduler::new(session.clone(), target);
//!     poll.start(Duration::from_secs(2)).await?;
//!     tokio::time::sleep(Duration::from_secs(10)).await;
//!     poll.stop().await;
//!
//!     print!("{}", session.series().to_csv().await);
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod error;
pub mod export;
pub mod guard;
pub mod mock;
pub mod operations;
pub mod poll;
pub mod resolver;
pub mod retry;
pub mod scan;
pub mod session;
pub mod transport;
pub mod util;

// Core exports
pub use device::{BleTransport, ConnectionConfig};
pub use error::{Error, NotFoundKind, Result};
pub use export::{CSV_HEADER, to_csv, write_csv};
pub use mock::{MockTransport, MockTransportBuilder, RecordedWrite};
pub use operations::{SampleStream, SubscribeOutcome, Terminator, WriteMode, WriteReport};
pub use poll::{
    MIN_POLL_INTERVAL, PollOptions, PollOptionsBuilder, PollScheduler, PollState, TickOverlap,
};
pub use resolver::ServiceDescription;
pub use retry::{RetryConfig, with_retry};
pub use scan::{DiscoveredDevice, ScanOptions};
pub use session::{ConnectionSession, SampleSeries, SessionConfig};
pub use transport::{
    Capabilities, CharacteristicInfo, NotificationStream, ServiceInfo, Transport, WritePrimitive,
};
pub use util::{create_identifier, format_peripheral_id};

/// Type alias for a shared session.
pub type SharedSession = std::sync::Arc<ConnectionSession>;

// Re-export from blediag-types
pub use blediag_types::uuids;
pub use blediag_types::{CharacteristicRef, Decoded, Format, Sample};
