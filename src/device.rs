// Capability boundary for the fingerprint sensor
// The vendor SDK lives behind this trait; the crate never talks to
// hardware directly. No ambient device singleton: the scan loop and the
// enrollment flow receive an explicit device object.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use crate::matcher::{Capture, Template};

// ============================================================================
// DEVICE ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Sensor not initialized or unplugged
    NotReady,

    /// Hardware fault reported by the capability layer
    Fault(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotReady => write!(f, "Fingerprint reader not ready"),
            DeviceError::Fault(msg) => write!(f, "Fingerprint reader fault: {}", msg),
        }
    }
}

impl std::error::Error for DeviceError {}

// ============================================================================
// FINGERPRINT DEVICE
// ============================================================================

/// One physical sensor. `capture` must respect the timeout and never block
/// indefinitely; a quiet sensor (no finger placed) is `Ok(None)`, not an
/// error.
pub trait FingerprintDevice {
    fn device_ready(&self) -> bool;

    fn capture(&mut self, timeout: Duration) -> Result<Option<Capture>, DeviceError>;
}

// ============================================================================
// SIMULATED DEVICE
// ============================================================================

/// Scriptable in-memory sensor. Replays a queue of outcomes, then reads as
/// an empty sensor. Drives the demo binary and the scan-loop tests.
pub struct SimulatedDevice {
    script: VecDeque<ScanOutcome>,
    ready: bool,
}

enum ScanOutcome {
    Finger(Capture),
    Empty,
    Fault(String),
}

impl SimulatedDevice {
    pub fn new() -> Self {
        SimulatedDevice {
            script: VecDeque::new(),
            ready: true,
        }
    }

    /// Queue a finger placement producing the given template.
    pub fn push_finger(&mut self, template: Template) {
        self.script
            .push_back(ScanOutcome::Finger(Capture::new(template, 85)));
    }

    /// Queue one empty read (no finger on the sensor).
    pub fn push_empty(&mut self) {
        self.script.push_back(ScanOutcome::Empty);
    }

    /// Queue a hardware fault.
    pub fn push_fault(&mut self, message: &str) {
        self.script
            .push_back(ScanOutcome::Fault(message.to_string()));
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintDevice for SimulatedDevice {
    fn device_ready(&self) -> bool {
        self.ready
    }

    fn capture(&mut self, _timeout: Duration) -> Result<Option<Capture>, DeviceError> {
        if !self.ready {
            return Err(DeviceError::NotReady);
        }

        match self.script.pop_front() {
            Some(ScanOutcome::Finger(capture)) => Ok(Some(capture)),
            Some(ScanOutcome::Empty) | None => Ok(None),
            Some(ScanOutcome::Fault(msg)) => Err(DeviceError::Fault(msg)),
        }
    }
}
