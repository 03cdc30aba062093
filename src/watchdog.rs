//! Integrity watchdog
//!
//! Sweeps the protected paths through the integrity gate on a fixed
//! cadence, independent of any client session. The gate does the
//! alerting; this thread only provides the heartbeat.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::info;

use crate::integrity::IntegrityGate;

pub fn start(
    gate: Arc<IntegrityGate>,
    paths: Vec<String>,
    interval: Duration,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        info!(
            "integrity watchdog: {} path(s), sweep every {:?}",
            paths.len(),
            interval
        );
        loop {
            for name in &paths {
                gate.has_changed(name);
            }
            thread::sleep(interval);
        }
    })
}
