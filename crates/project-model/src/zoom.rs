//! Zoom effects detected from pointer clicks during capture.
//!
//! Each click while recording produces one [`ZoomEffect`] anchored to the
//! capture's start instant. Effects are append-only: insertion order is
//! chronological order.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Milliseconds since the capture's start instant.
pub type TimestampMs = u64;

/// Duration every zoom effect is scheduled for.
pub const ZOOM_EFFECT_DURATION_MS: u64 = 2000;

/// Scale factor every zoom effect zooms to.
pub const ZOOM_EFFECT_LEVEL: f64 = 1.5;

/// Opaque identifier of a zoom effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoomId(String);

static NEXT_ZOOM_SEQ: AtomicU64 = AtomicU64::new(0);

impl ZoomId {
    /// Generate an identifier unique within this process.
    ///
    /// A process-wide sequence guarantees uniqueness; the time seed keeps
    /// ids from different runs from colliding when timelines are merged.
    pub fn generate() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};

        let seq = NEXT_ZOOM_SEQ.fetch_add(1, Ordering::Relaxed);
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self(format!("{:08x}-{seq:06x}", (seed >> 16) as u32))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ZoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized pointer position at sampling time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    /// Normalized X coordinate, nominally `[0.0, 1.0]`.
    pub x: f64,
    /// Normalized Y coordinate, nominally `[0.0, 1.0]`.
    pub y: f64,
}

impl CursorPosition {
    /// Normalize client coordinates against the viewport they were sampled in.
    ///
    /// Values outside the viewport are kept as-is. A zero-sized viewport
    /// axis yields `0.0`.
    pub fn normalize(client_x: f64, client_y: f64, viewport_width: f64, viewport_height: f64) -> Self {
        let axis = |value: f64, extent: f64| if extent > 0.0 { value / extent } else { 0.0 };
        Self {
            x: axis(client_x, viewport_width),
            y: axis(client_y, viewport_height),
        }
    }

    /// Whether both coordinates fall inside the unit square.
    pub fn is_within_viewport(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

/// One detected click during capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoomEffect {
    pub id: ZoomId,

    /// Milliseconds since capture start.
    pub timestamp: TimestampMs,

    /// Intended effect duration in milliseconds.
    pub duration: u64,

    /// Scale factor, always greater than 1.0.
    pub zoom_level: f64,

    pub cursor_position: CursorPosition,
}

impl ZoomEffect {
    /// Build an effect with the fixed duration and zoom policy.
    pub fn at(timestamp: TimestampMs, cursor_position: CursorPosition) -> Self {
        Self {
            id: ZoomId::generate(),
            timestamp,
            duration: ZOOM_EFFECT_DURATION_MS,
            zoom_level: ZOOM_EFFECT_LEVEL,
            cursor_position,
        }
    }

    /// Timestamp as fractional seconds since capture start.
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp as f64 / 1000.0
    }

    /// Timestamp formatted the way the editor sidebar shows it (`"1.3s"`).
    ///
    /// Tenths are rounded half up, so 1250 ms reads `1.3s`.
    pub fn label(&self) -> String {
        let tenths = self.timestamp.saturating_add(50) / 100;
        format!("{}.{}s", tenths / 10, tenths % 10)
    }
}

/// Ordered, append-only sequence of zoom effects for one recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoomTimeline {
    effects: Vec<ZoomEffect>,
}

impl ZoomTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an effect. No deduplication or rate limiting.
    pub fn push(&mut self, effect: ZoomEffect) {
        self.effects.push(effect);
    }

    pub fn clear(&mut self) {
        self.effects.clear();
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn effects(&self) -> &[ZoomEffect] {
        &self.effects
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZoomEffect> {
        self.effects.iter()
    }

    /// Whether timestamps never decrease in insertion order.
    pub fn is_chronological(&self) -> bool {
        self.effects
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    }

    /// Labels for the first `limit` effects, plus whether more were omitted.
    pub fn summary(&self, limit: usize) -> (Vec<String>, bool) {
        let labels = self.effects.iter().take(limit).map(ZoomEffect::label).collect();
        (labels, self.effects.len() > limit)
    }
}

impl From<Vec<ZoomEffect>> for ZoomTimeline {
    fn from(effects: Vec<ZoomEffect>) -> Self {
        Self { effects }
    }
}
