//! V.ZONE Input Tracker
//!
//! Turns pointer-down events into zoom effects while a capture is running.
//!
//! Pointer sources publish [`PointerDown`] samples into a [`PointerHub`].
//! A [`ZoomTracker`] subscribes to the hub only while recording; dropping
//! it unsubscribes, so clicks outside the recording window are never seen.
//! Sources are pluggable:
//!
//! - **Evdev:** `/dev/input/mice` (Linux, requires `input` group)
//! - **Stub:** scripted samples for headless runs and tests

pub mod backends;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use vzone_common::clock::{DriftMeasurement, RecordingClock};
use vzone_common::error::VzoneResult;
use vzone_project_model::{CursorPosition, ZoomEffect};

/// Samples buffered per subscriber before the oldest are dropped.
const HUB_CAPACITY: usize = 256;

/// Start-latency drift between recorder and tracker worth reporting.
const DRIFT_WARN_THRESHOLD_MS: u64 = 100;

/// One primary-pointer press in client coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerDown {
    pub client_x: f64,
    pub client_y: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,

    /// When the press was sampled.
    pub at: Instant,
}

impl PointerDown {
    /// A press sampled now.
    pub fn now(client_x: f64, client_y: f64, viewport_width: f64, viewport_height: f64) -> Self {
        Self {
            client_x,
            client_y,
            viewport_width,
            viewport_height,
            at: Instant::now(),
        }
    }

    pub fn position(&self) -> CursorPosition {
        CursorPosition::normalize(
            self.client_x,
            self.client_y,
            self.viewport_width,
            self.viewport_height,
        )
    }
}

/// Fan-out point for pointer samples.
#[derive(Debug, Clone)]
pub struct PointerHub {
    sender: broadcast::Sender<PointerDown>,
}

impl PointerHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(HUB_CAPACITY);
        Self { sender }
    }

    /// Publish a sample. Returns how many trackers received it; samples
    /// published with nobody listening are discarded.
    pub fn publish(&self, event: PointerDown) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PointerDown> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for PointerHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts pointer samples into zoom effects relative to a capture clock.
pub struct ZoomTracker {
    receiver: broadcast::Receiver<PointerDown>,
    clock: RecordingClock,
    effects_emitted: u64,
}

impl ZoomTracker {
    /// Subscribe to `hub`. Only samples published after this call are seen.
    pub fn subscribe(hub: &PointerHub, clock: RecordingClock) -> Self {
        Self {
            receiver: hub.subscribe(),
            clock,
            effects_emitted: 0,
        }
    }

    /// Subscribe and report how far the subscription trails the recorder
    /// start, both measured against `clock`.
    pub fn subscribe_measured(
        hub: &PointerHub,
        clock: RecordingClock,
        media_start_offset_ms: u64,
    ) -> Self {
        let drift = DriftMeasurement {
            reference_ms: media_start_offset_ms,
            measured_ms: clock.elapsed_ms(),
        };
        if drift.exceeds_threshold_ms(DRIFT_WARN_THRESHOLD_MS) {
            tracing::warn!(
                drift_ms = drift.drift_ms(),
                threshold_ms = DRIFT_WARN_THRESHOLD_MS,
                "Pointer tracking started late relative to recorder"
            );
        } else {
            tracing::debug!(drift_ms = drift.drift_ms(), "Pointer tracking attached");
        }
        Self::subscribe(hub, clock)
    }

    /// Wait for the next zoom effect.
    ///
    /// Returns `None` once every publisher is gone. Cancel safe.
    pub async fn next_effect(&mut self) -> Option<ZoomEffect> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(self.effect_for(&event)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Zoom tracker lagged; pointer samples dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Build the effect for one sample.
    pub fn effect_for(&mut self, event: &PointerDown) -> ZoomEffect {
        let timestamp = self.clock.elapsed_ms_at(event.at);
        self.effects_emitted += 1;
        let effect = ZoomEffect::at(timestamp, event.position());
        tracing::debug!(
            timestamp_ms = effect.timestamp,
            x = effect.cursor_position.x,
            y = effect.cursor_position.y,
            "Zoom effect detected"
        );
        effect
    }

    pub fn effects_emitted(&self) -> u64 {
        self.effects_emitted
    }
}

/// Source of pointer-down samples.
pub trait InputBackend: Send {
    /// Poll for the next press. Returns `None` if none is available.
    fn poll(&mut self) -> VzoneResult<Option<PointerDown>>;

    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Check if the backend is available on this system.
    fn is_available(&self) -> bool;
}

/// Drives an [`InputBackend`] and publishes its samples into a hub.
pub struct PointerPump {
    backend: Box<dyn InputBackend>,
    hub: PointerHub,
    stop_flag: Arc<AtomicBool>,
    events_published: u64,
}

impl PointerPump {
    pub fn new(backend: Box<dyn InputBackend>, hub: PointerHub) -> Self {
        Self {
            backend,
            hub,
            stop_flag: Arc::new(AtomicBool::new(false)),
            events_published: 0,
        }
    }

    /// Run the polling loop until the stop flag is set.
    pub async fn run(&mut self) -> VzoneResult<u64> {
        tracing::info!(backend = %self.backend.name(), "Pointer pump started");

        while !self.stop_flag.load(Ordering::Relaxed) {
            match self.backend.poll() {
                Ok(Some(event)) => {
                    self.hub.publish(event);
                    self.events_published += 1;
                }
                Ok(None) => {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Pointer polling error");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }

        tracing::info!(events = self.events_published, "Pointer pump stopped");
        Ok(self.events_published)
    }

    /// Set the stop flag.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    /// Get the stop flag for external coordination.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    pub fn events_published(&self) -> u64 {
        self.events_published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::StubBackend;

    #[tokio::test(start_paused = true)]
    async fn test_effect_timestamp_is_relative_to_clock() {
        let hub = PointerHub::new();
        let clock = RecordingClock::start();
        let mut tracker = ZoomTracker::subscribe(&hub, clock);

        tokio::time::advance(Duration::from_millis(1_200)).await;
        assert_eq!(hub.publish(PointerDown::now(960.0, 540.0, 1920.0, 1080.0)), 1);

        let effect = tracker.next_effect().await.unwrap();
        assert_eq!(effect.timestamp, 1_200);
        assert_eq!(effect.cursor_position, CursorPosition { x: 0.5, y: 0.5 });
        assert_eq!(effect.duration, 2000);
        assert_eq!(effect.zoom_level, 1.5);
        assert_eq!(effect.label(), "1.2s");
    }

    #[tokio::test]
    async fn test_samples_before_subscription_are_not_seen() {
        let hub = PointerHub::new();
        assert_eq!(hub.publish(PointerDown::now(1.0, 1.0, 10.0, 10.0)), 0);

        let mut tracker = ZoomTracker::subscribe(&hub, RecordingClock::start());
        hub.publish(PointerDown::now(5.0, 5.0, 10.0, 10.0));
        let effect = tracker.next_effect().await.unwrap();
        assert_eq!(effect.cursor_position.x, 0.5);
    }

    #[tokio::test]
    async fn test_dropping_tracker_unsubscribes() {
        let hub = PointerHub::new();
        let tracker = ZoomTracker::subscribe(&hub, RecordingClock::start());
        assert_eq!(hub.subscriber_count(), 1);
        drop(tracker);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_hub_ends_tracker() {
        let hub = PointerHub::new();
        let mut tracker = ZoomTracker::subscribe(&hub, RecordingClock::start());
        drop(hub);
        assert!(tracker.next_effect().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_before_epoch_saturates_to_zero() {
        let hub = PointerHub::new();
        let early = PointerDown::now(0.0, 0.0, 100.0, 100.0);
        tokio::time::advance(Duration::from_millis(50)).await;
        let mut tracker = ZoomTracker::subscribe(&hub, RecordingClock::start());
        assert_eq!(tracker.effect_for(&early).timestamp, 0);
        assert_eq!(tracker.effects_emitted(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_publishes_backend_samples() {
        let hub = PointerHub::new();
        let mut tracker = ZoomTracker::subscribe(&hub, RecordingClock::start());
        let backend = StubBackend::new(vec![
            PointerDown::now(10.0, 20.0, 100.0, 100.0),
            PointerDown::now(90.0, 80.0, 100.0, 100.0),
        ]);
        let mut pump = PointerPump::new(Box::new(backend), hub.clone());
        let stop = pump.stop_flag();
        let handle = tokio::spawn(async move { pump.run().await });

        let first = tracker.next_effect().await.unwrap();
        let second = tracker.next_effect().await.unwrap();
        assert_eq!(first.cursor_position, CursorPosition { x: 0.1, y: 0.2 });
        assert_eq!(second.cursor_position, CursorPosition { x: 0.9, y: 0.8 });

        stop.store(true, Ordering::SeqCst);
        assert_eq!(handle.await.unwrap().unwrap(), 2);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn every_sample_becomes_one_effect_in_order(
                gaps in proptest::collection::vec(prop_oneof![Just(0u64), 0u64..400], 1..48),
            ) {
                let clock = RecordingClock::start();
                let mut tracker = ZoomTracker::subscribe(&PointerHub::new(), clock.clone());

                let mut offset = 0;
                let mut expected = Vec::with_capacity(gaps.len());
                let mut stamps = Vec::with_capacity(gaps.len());
                for gap in gaps {
                    offset += gap;
                    expected.push(offset);
                    let sample = PointerDown {
                        client_x: 100.0,
                        client_y: 50.0,
                        viewport_width: 200.0,
                        viewport_height: 100.0,
                        at: clock.epoch() + Duration::from_millis(offset),
                    };
                    stamps.push(tracker.effect_for(&sample).timestamp);
                }

                prop_assert_eq!(tracker.effects_emitted(), expected.len() as u64);
                prop_assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
                prop_assert_eq!(stamps, expected);
            }
        }
    }
}
