//! Linux pointer backend reading `/dev/input/mice`.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Read;
use std::os::unix::fs::MetadataExt;
use std::os::unix::fs::OpenOptionsExt;

use vzone_common::error::{VzoneError, VzoneResult};

use crate::backends::StubBackend;
use crate::{InputBackend, PointerDown};

const MICE_DEVICE: &str = "/dev/input/mice";

/// Button bits of a PS/2 packet header: left, right, middle.
const BUTTON_MASKS: [u8; 3] = [0b001, 0b010, 0b100];

/// Relative-motion pointer backend.
///
/// The absolute position is reconstructed from deltas starting at the
/// viewport centre, so it drifts from the real cursor if the pointer hits a
/// screen edge the kernel does not know about.
pub struct EvdevBackend {
    device: std::fs::File,
    pending: VecDeque<PointerDown>,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    button_state: [bool; 3],
}

impl EvdevBackend {
    pub fn new(viewport: (f64, f64)) -> VzoneResult<Self> {
        let device = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(MICE_DEVICE)
            .map_err(|e| VzoneError::capture(format!("Failed to open {MICE_DEVICE}: {e}")))?;

        let (width, height) = viewport;
        Ok(Self {
            device,
            pending: VecDeque::new(),
            x: 0.5,
            y: 0.5,
            width: width.max(1.0),
            height: height.max(1.0),
            button_state: [false; 3],
        })
    }

    pub fn is_supported() -> bool {
        OpenOptions::new().read(true).open(MICE_DEVICE).is_ok()
    }

    fn ingest_packets(&mut self) -> VzoneResult<()> {
        loop {
            let mut packet = [0u8; 3];
            match self.device.read(&mut packet) {
                Ok(3) => self.process_packet(packet),
                Ok(_) => break,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    return Err(VzoneError::capture(format!(
                        "Failed reading {MICE_DEVICE}: {err}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn process_packet(&mut self, packet: [u8; 3]) {
        let dx = packet[1] as i8 as f64;
        let dy = packet[2] as i8 as f64;

        self.x = (self.x + dx / self.width).clamp(0.0, 1.0);
        self.y = (self.y - dy / self.height).clamp(0.0, 1.0);

        for (idx, mask) in BUTTON_MASKS.iter().enumerate() {
            let pressed = packet[0] & mask != 0;
            let previous = std::mem::replace(&mut self.button_state[idx], pressed);
            if pressed && !previous {
                self.pending.push_back(PointerDown::now(
                    self.x * self.width,
                    self.y * self.height,
                    self.width,
                    self.height,
                ));
            }
        }
    }
}

impl InputBackend for EvdevBackend {
    fn poll(&mut self) -> VzoneResult<Option<PointerDown>> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        self.ingest_packets()?;
        Ok(self.pending.pop_front())
    }

    fn name(&self) -> &str {
        "evdev"
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Detect the best available pointer backend for the current system.
pub fn detect_best_backend(viewport: (f64, f64)) -> Box<dyn InputBackend> {
    if EvdevBackend::is_supported() {
        match EvdevBackend::new(viewport) {
            Ok(backend) => {
                tracing::info!("Using evdev pointer backend");
                return Box::new(backend);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to initialize evdev backend, using stub");
            }
        }
    }

    tracing::warn!(
        details = %mice_device_diagnostic(),
        "Using stub pointer backend; clicks will not produce zoom effects"
    );
    Box::new(StubBackend::empty())
}

fn mice_device_diagnostic() -> String {
    // SAFETY: geteuid/getegid have no preconditions.
    let uid = unsafe { libc::geteuid() };
    let gid = unsafe { libc::getegid() };

    match std::fs::metadata(MICE_DEVICE) {
        Ok(meta) => format!(
            "device={MICE_DEVICE} mode={:o} owner_uid={} owner_gid={} process_uid={uid} process_gid={gid}; likely missing 'input' group membership. Fix: sudo usermod -aG input $USER && log out/in",
            meta.mode() & 0o777,
            meta.uid(),
            meta.gid()
        ),
        Err(err) => format!(
            "device={MICE_DEVICE} unavailable ({err}); ensure the kernel input device exists and is readable"
        ),
    }
}
