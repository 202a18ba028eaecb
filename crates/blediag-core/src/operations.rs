//! Read, write, subscribe and unsubscribe against one characteristic.
//!
//! Every operation runs the connection guard, resolves the characteristic,
//! and then talks to the transport. Values are decoded with
//! [`decode_all`](blediag_types::codec::decode_all) so multi-slot payloads
//! show every slot.

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use blediag_types::{CharacteristicRef, Format, Sample, codec};

use crate::error::{Error, Result};
use crate::session::{ConnectionSession, SampleSeries, SessionConfig, build_sample};
use crate::transport::{Capabilities, CharacteristicInfo, WritePrimitive};

/// Buffered samples per subscription stream.
const SUBSCRIPTION_BUFFER: usize = 64;

/// How to pick the write primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WriteMode {
    /// First advertised of with-response, without-response, generic.
    #[default]
    Auto,
    WithResponse,
    WithoutResponse,
    Generic,
}

impl WriteMode {
    /// Choose the primitive for a characteristic.
    ///
    /// Forced modes are used only when the characteristic (or, for
    /// `Generic`, the transport) supports them.
    pub fn select(
        self,
        capabilities: Capabilities,
        generic_available: bool,
    ) -> Option<WritePrimitive> {
        match self {
            WriteMode::WithResponse => capabilities.write.then_some(WritePrimitive::WithResponse),
            WriteMode::WithoutResponse => capabilities
                .write_without_response
                .then_some(WritePrimitive::WithoutResponse),
            WriteMode::Generic => generic_available.then_some(WritePrimitive::Generic),
            WriteMode::Auto => {
                if capabilities.write {
                    Some(WritePrimitive::WithResponse)
                } else if capabilities.write_without_response {
                    Some(WritePrimitive::WithoutResponse)
                } else if generic_available {
                    Some(WritePrimitive::Generic)
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Auto => write!(f, "auto"),
            WriteMode::WithResponse => write!(f, "with-response"),
            WriteMode::WithoutResponse => write!(f, "without-response"),
            WriteMode::Generic => write!(f, "generic"),
        }
    }
}

impl FromStr for WriteMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "auto" => Ok(WriteMode::Auto),
            "with-response" | "response" => Ok(WriteMode::WithResponse),
            "without-response" | "no-response" | "command" => Ok(WriteMode::WithoutResponse),
            "generic" => Ok(WriteMode::Generic),
            other => Err(Error::invalid_config(format!("unknown write mode '{}'", other))),
        }
    }
}

/// Line terminator appended after the encoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Terminator {
    #[default]
    None,
    Lf,
    Cr,
    CrLf,
}

impl Terminator {
    /// The terminator bytes.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Terminator::None => &[],
            Terminator::Lf => b"\n",
            Terminator::Cr => b"\r",
            Terminator::CrLf => b"\r\n",
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::None => write!(f, "none"),
            Terminator::Lf => write!(f, "lf"),
            Terminator::Cr => write!(f, "cr"),
            Terminator::CrLf => write!(f, "crlf"),
        }
    }
}

impl FromStr for Terminator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Terminator::None),
            "lf" | "\\n" => Ok(Terminator::Lf),
            "cr" | "\\r" => Ok(Terminator::Cr),
            "crlf" | "\\r\\n" => Ok(Terminator::CrLf),
            other => Err(Error::invalid_config(format!("unknown terminator '{}'", other))),
        }
    }
}

/// What a write sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    /// Payload including the terminator.
    pub bytes: Bytes,
    pub primitive: WritePrimitive,
}

/// Decoded notifications from the active subscription.
///
/// The stream ends when the subscription is torn down.
pub struct SampleStream {
    receiver: mpsc::Receiver<Sample>,
}

impl Stream for SampleStream {
    type Item = Sample;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

/// Result of [`ConnectionSession::subscribe`].
pub enum SubscribeOutcome {
    /// A new subscription was set up.
    Started(SampleStream),
    /// The same characteristic is already subscribed; nothing changed.
    AlreadyActive,
}

impl fmt::Debug for SubscribeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscribeOutcome::Started(_) => write!(f, "Started"),
            SubscribeOutcome::AlreadyActive => write!(f, "AlreadyActive"),
        }
    }
}

/// Where notification samples go.
pub(crate) enum SampleSink {
    Channel(mpsc::Sender<Sample>),
    Series(Arc<SampleSeries>),
}

/// The session's single notification subscription.
pub(crate) struct ActiveSubscription {
    pub(crate) target: CharacteristicRef,
    characteristic: CharacteristicInfo,
    /// Samples go to the session series rather than a caller's stream.
    feeds_series: bool,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ConnectionSession {
    /// Read and decode the current value.
    ///
    /// The sample is returned to the caller; it is not appended to the
    /// session series.
    #[tracing::instrument(level = "debug", skip(self), fields(target = %target, format = %format))]
    pub async fn read(&self, target: &CharacteristicRef, format: Format) -> Result<Sample> {
        self.ensure_default().await?;
        let characteristic = self.resolve_characteristic(target).await?;
        let bytes = self.transport.read(&characteristic).await?;
        debug!("Read {} byte(s)", bytes.len());
        Ok(self.make_sample(bytes, format, target))
    }

    /// Encode `text`, append the terminator, and write it.
    ///
    /// Encoding happens first so invalid input never reaches the link.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] when `text` is not valid for `format`
    /// - [`Error::UnsupportedOperation`] when no usable write primitive exists
    #[tracing::instrument(level = "debug", skip(self, text), fields(target = %target, format = %format, mode = %mode))]
    pub async fn write(
        &self,
        target: &CharacteristicRef,
        format: Format,
        text: &str,
        mode: WriteMode,
        terminator: Terminator,
    ) -> Result<WriteReport> {
        let encoded = codec::encode(text, format)?;
        let mut payload = BytesMut::with_capacity(encoded.len() + 2);
        payload.extend_from_slice(&encoded);
        payload.extend_from_slice(terminator.as_bytes());
        let payload = payload.freeze();

        self.ensure_default().await?;
        let characteristic = self.resolve_characteristic(target).await?;
        let primitive = mode
            .select(
                characteristic.capabilities,
                self.transport.supports_generic_write(),
            )
            .ok_or_else(|| Error::unsupported("write", target.characteristic))?;

        self.transport
            .write(&characteristic, &payload, primitive)
            .await?;
        info!(
            "Sent {} ({} byte(s), {})",
            codec::to_hex(&payload),
            payload.len(),
            primitive
        );

        Ok(WriteReport {
            bytes: payload,
            primitive,
        })
    }

    /// Subscribe to value changes and stream decoded samples.
    ///
    /// Only one subscription exists per session. Subscribing to another
    /// characteristic tears the current one down first; subscribing to the
    /// same one again changes nothing.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedOperation`] when the characteristic can neither
    /// notify nor indicate. The current subscription is left in place.
    #[tracing::instrument(level = "debug", skip(self), fields(target = %target, format = %format))]
    pub async fn subscribe(
        &self,
        target: &CharacteristicRef,
        format: Format,
    ) -> Result<SubscribeOutcome> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let started = self
            .subscribe_with_sink(target, format, SampleSink::Channel(tx))
            .await?;
        Ok(if started {
            SubscribeOutcome::Started(SampleStream { receiver: rx })
        } else {
            SubscribeOutcome::AlreadyActive
        })
    }

    /// Subscribe with samples appended to the session series.
    ///
    /// Returns whether a new subscription was started.
    pub(crate) async fn subscribe_into_series(
        &self,
        target: &CharacteristicRef,
        format: Format,
    ) -> Result<bool> {
        let sink = SampleSink::Series(Arc::clone(&self.series));
        self.subscribe_with_sink(target, format, sink).await
    }

    async fn subscribe_with_sink(
        &self,
        target: &CharacteristicRef,
        format: Format,
        sink: SampleSink,
    ) -> Result<bool> {
        let feeds_series = matches!(sink, SampleSink::Series(_));
        let mut slot = self.subscription.lock().await;
        if let Some(active) = slot.as_ref()
            && active.target == *target
        {
            if active.feeds_series == feeds_series {
                debug!("Already subscribed to {}", target);
            } else {
                warn!(
                    "{} is already subscribed by another consumer; its samples keep going there",
                    target
                );
            }
            return Ok(false);
        }

        self.ensure_default().await?;
        let characteristic = self.resolve_characteristic(target).await?;
        if !characteristic.capabilities.can_push() {
            warn!(
                "{} does not support notifications {}",
                target.characteristic, characteristic.capabilities
            );
            return Err(Error::unsupported("notify", target.characteristic));
        }

        if let Some(previous) = slot.take() {
            self.teardown(previous).await;
        }

        let stream = self.transport.subscribe(&characteristic).await?;
        let cancel = CancellationToken::new();
        let task = spawn_notification_task(
            stream,
            cancel.clone(),
            Arc::clone(&self.config),
            *target,
            format,
            sink,
        );

        info!("Subscribed to {}", target);
        *slot = Some(ActiveSubscription {
            target: *target,
            characteristic,
            feeds_series,
            cancel,
            task,
        });
        Ok(true)
    }

    /// Tear down the active subscription if it feeds the session series.
    ///
    /// Caller-owned subscriptions are left alone.
    pub(crate) async fn release_series_subscription(&self) {
        let mut slot = self.subscription.lock().await;
        if !slot.as_ref().is_some_and(|active| active.feeds_series) {
            return;
        }
        if let Some(active) = slot.take() {
            self.teardown(active).await;
        }
    }

    /// Stop the active subscription. No-op when there is none.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn unsubscribe(&self) -> Result<()> {
        let Some(active) = self.subscription.lock().await.take() else {
            return Ok(());
        };
        active.cancel.cancel();
        let result = self.transport.unsubscribe(&active.characteristic).await;
        info!("Unsubscribed from {}", active.target);
        result
    }

    /// The currently subscribed characteristic, if any.
    pub async fn active_subscription(&self) -> Option<CharacteristicRef> {
        self.subscription
            .lock()
            .await
            .as_ref()
            .filter(|active| !active.task.is_finished())
            .map(|active| active.target)
    }

    async fn teardown(&self, active: ActiveSubscription) {
        active.cancel.cancel();
        if let Err(e) = self.transport.unsubscribe(&active.characteristic).await {
            warn!("Failed to stop notifications on {}: {}", active.target, e);
        }
        debug!("Tore down subscription to {}", active.target);
    }
}

fn spawn_notification_task(
    mut stream: crate::transport::NotificationStream,
    cancel: CancellationToken,
    config: Arc<SessionConfig>,
    target: CharacteristicRef,
    format: Format,
    sink: SampleSink,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Subscription to {} cancelled", target);
                    break;
                }
                next = stream.next() => {
                    let Some(value) = next else {
                        debug!("Notification stream for {} ended", target);
                        break;
                    };
                    let sample = build_sample(&config, value, format, &target);
                    match &sink {
                        SampleSink::Channel(tx) => {
                            if tx.send(sample).await.is_err() {
                                debug!("Subscription receiver dropped");
                                break;
                            }
                        }
                        SampleSink::Series(series) => series.push(sample).await,
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_write_preference() {
        let all = Capabilities::ALL;
        assert_eq!(
            WriteMode::Auto.select(all, true),
            Some(WritePrimitive::WithResponse)
        );

        let command_only = Capabilities {
            write_without_response: true,
            ..Default::default()
        };
        assert_eq!(
            WriteMode::Auto.select(command_only, true),
            Some(WritePrimitive::WithoutResponse)
        );

        assert_eq!(
            WriteMode::Auto.select(Capabilities::READ, true),
            Some(WritePrimitive::Generic)
        );
        assert_eq!(WriteMode::Auto.select(Capabilities::READ, false), None);
    }

    #[test]
    fn test_forced_write_modes_require_capability() {
        assert_eq!(WriteMode::WithResponse.select(Capabilities::READ, true), None);
        assert_eq!(
            WriteMode::WithoutResponse.select(Capabilities::ALL, false),
            Some(WritePrimitive::WithoutResponse)
        );
        assert_eq!(WriteMode::Generic.select(Capabilities::ALL, false), None);
    }

    #[test]
    fn test_terminator_bytes() {
        assert_eq!(Terminator::None.as_bytes(), b"");
        assert_eq!(Terminator::Lf.as_bytes(), &[0x0a]);
        assert_eq!(Terminator::Cr.as_bytes(), &[0x0d]);
        assert_eq!(Terminator::CrLf.as_bytes(), &[0x0d, 0x0a]);
    }

    #[test]
    fn test_parse_modes_and_terminators() {
        assert_eq!("auto".parse::<WriteMode>().unwrap(), WriteMode::Auto);
        assert_eq!(
            "without_response".parse::<WriteMode>().unwrap(),
            WriteMode::WithoutResponse
        );
        assert!("sometimes".parse::<WriteMode>().is_err());

        assert_eq!("CRLF".parse::<Terminator>().unwrap(), Terminator::CrLf);
        assert_eq!("\\n".parse::<Terminator>().unwrap(), Terminator::Lf);
        assert!("tab".parse::<Terminator>().is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn capabilities() -> impl Strategy<Value = Capabilities> {
        any::<[bool; 5]>().prop_map(|[read, write, write_without_response, notify, indicate]| {
            Capabilities {
                read,
                write,
                write_without_response,
                notify,
                indicate,
            }
        })
    }

    proptest! {
        #[test]
        fn auto_selects_whenever_anything_is_available(
            caps in capabilities(),
            generic in any::<bool>(),
        ) {
            let selected = WriteMode::Auto.select(caps, generic);
            prop_assert_eq!(selected.is_some(), caps.can_write() || generic);
        }

        #[test]
        fn forced_modes_never_pick_another_primitive(
            caps in capabilities(),
            generic in any::<bool>(),
        ) {
            for (mode, primitive) in [
                (WriteMode::WithResponse, WritePrimitive::WithResponse),
                (WriteMode::WithoutResponse, WritePrimitive::WithoutResponse),
                (WriteMode::Generic, WritePrimitive::Generic),
            ] {
                if let Some(selected) = mode.select(caps, generic) {
                    prop_assert_eq!(selected, primitive);
                }
            }
        }
    }
}
