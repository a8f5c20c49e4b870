//! Test and helper doubles for rcdrive_core.

use std::sync::{Arc, Mutex};

use rcdrive_traits::{DriveOutput, DutyPair, HwResult, RangeSensor};

/// Drive output that records every duty pair written to it.
///
/// Clones share the same log, so a test can keep one handle while the motor
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingDrive {
    log: Arc<Mutex<Vec<DutyPair>>>,
}

impl RecordingDrive {
    pub fn new() -> Self {
        Self::default()
    }

    /// All writes so far, oldest first.
    pub fn writes(&self) -> Vec<DutyPair> {
        self.log.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<DutyPair> {
        self.log.lock().ok().and_then(|g| g.last().copied())
    }
}

impl DriveOutput for RecordingDrive {
    fn set_duty(&mut self, duty: DutyPair) -> HwResult<()> {
        if let Ok(mut g) = self.log.lock() {
            g.push(duty);
        }
        Ok(())
    }
}

/// Range sensor that never sees a target.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTargetSensor;

impl RangeSensor for NoTargetSensor {
    fn read_mm(&mut self, _timeout: std::time::Duration) -> HwResult<Option<u16>> {
        Ok(None)
    }
}
