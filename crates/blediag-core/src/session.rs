//! The connection session: one transport, one subscription slot, one series.
//!
//! A [`ConnectionSession`] is shared by `Arc` between the CLI, the poll
//! scheduler and any subscription tasks. Operations live in sibling modules
//! as further `impl ConnectionSession` blocks:
//!
//! - [`guard`](crate::guard): `ensure`
//! - [`resolver`](crate::resolver): service and characteristic resolution
//! - [`operations`](crate::operations): read, write, subscribe, unsubscribe

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use blediag_types::{AdcDecoder, AutoFormatTable, CharacteristicRef, Format, Sample, codec};

use crate::operations::ActiveSubscription;
use crate::transport::Transport;

/// Default settle delay after the guard reconnects.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

/// Settle delay the resolver asks of the guard before discovery.
pub const DISCOVERY_SETTLE: Duration = Duration::from_millis(600);

/// Session-wide options.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Services to look up one by one when bulk discovery is unavailable.
    pub services: Vec<Uuid>,
    /// Rules for [`Format::Auto`].
    pub auto_formats: AutoFormatTable,
    /// ADC frame decoder applied to every read and notification.
    pub adc: AdcDecoder,
    /// Guard settle delay after a reconnect.
    pub settle: Duration,
    /// Guard settle delay used before service discovery.
    pub discovery_settle: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            services: vec![blediag_types::uuids::FFE0_SERVICE],
            auto_formats: AutoFormatTable::standard(),
            adc: AdcDecoder::default(),
            settle: DEFAULT_SETTLE,
            discovery_settle: DISCOVERY_SETTLE,
        }
    }
}

impl SessionConfig {
    /// Set the configured service list.
    #[must_use]
    pub fn services(mut self, services: Vec<Uuid>) -> Self {
        self.services = services;
        self
    }

    /// Set the auto-format table.
    #[must_use]
    pub fn auto_formats(mut self, table: AutoFormatTable) -> Self {
        self.auto_formats = table;
        self
    }

    /// Set the ADC decoder.
    #[must_use]
    pub fn adc(mut self, adc: AdcDecoder) -> Self {
        self.adc = adc;
        self
    }

    /// Set the guard settle delay.
    #[must_use]
    pub fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Set the settle delay used before discovery.
    #[must_use]
    pub fn discovery_settle(mut self, settle: Duration) -> Self {
        self.discovery_settle = settle;
        self
    }
}

#[derive(Debug, Default)]
struct SeriesInner {
    samples: Vec<Sample>,
    generation: u64,
}

/// In-memory, append-only sample series.
///
/// Every [`clear`](Self::clear) bumps a generation counter. A producer that
/// captured the generation before a slow read can use
/// [`push_if_generation`](Self::push_if_generation) so that its sample is
/// dropped if the series was cleared in the meantime.
#[derive(Debug, Default)]
pub struct SampleSeries {
    inner: RwLock<SeriesInner>,
}

impl SampleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample.
    pub async fn push(&self, sample: Sample) {
        self.inner.write().await.samples.push(sample);
    }

    /// Current generation.
    pub async fn generation(&self) -> u64 {
        self.inner.read().await.generation
    }

    /// Append a sample only if no clear happened since `generation` was read.
    ///
    /// Returns whether the sample was kept.
    pub async fn push_if_generation(&self, generation: u64, sample: Sample) -> bool {
        let mut inner = self.inner.write().await;
        if inner.generation != generation {
            debug!(
                "Dropping stale sample (generation {} != {})",
                generation, inner.generation
            );
            return false;
        }
        inner.samples.push(sample);
        true
    }

    /// Copy of every sample, oldest first.
    pub async fn snapshot(&self) -> Vec<Sample> {
        self.inner.read().await.samples.clone()
    }

    /// Most recent sample.
    pub async fn latest(&self) -> Option<Sample> {
        self.inner.read().await.samples.last().cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.samples.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every sample.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.samples.clear();
        inner.generation = inner.generation.wrapping_add(1);
    }

    /// Render the series as CSV.
    pub async fn to_csv(&self) -> String {
        crate::export::to_csv(&self.inner.read().await.samples)
    }
}

/// Shared state of one connection to one peripheral.
pub struct ConnectionSession {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: Arc<SessionConfig>,
    pub(crate) subscription: Mutex<Option<ActiveSubscription>>,
    pub(crate) series: Arc<SampleSeries>,
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConnectionSession {
    /// Create a session with default options.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    /// Create a session with custom options.
    pub fn with_config(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        Self {
            transport,
            config: Arc::new(config),
            subscription: Mutex::new(None),
            series: Arc::new(SampleSeries::new()),
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The session's sample series.
    pub fn series(&self) -> &SampleSeries {
        &self.series
    }

    pub(crate) fn make_sample(
        &self,
        bytes: Vec<u8>,
        format: Format,
        target: &CharacteristicRef,
    ) -> Sample {
        build_sample(&self.config, bytes, format, target)
    }
}

/// Build a sample from raw bytes: decode every slot, attach ADC channels.
pub(crate) fn build_sample(
    config: &SessionConfig,
    bytes: Vec<u8>,
    format: Format,
    target: &CharacteristicRef,
) -> Sample {
    let decoded = codec::decode_all_with_table(&bytes, format, Some(target), &config.auto_formats);
    if let Some(reason) = decoded.degrade_reason() {
        debug!("Decode of {} degraded to hex: {}", target.characteristic, reason);
    }
    let adc = config.adc.decode(&bytes, target);
    Sample::now(decoded.into_text(), Bytes::from(bytes)).with_adc(adc)
}
