// Scan Loop - the core attendance state machine
// Periodic capture, cooldown debounce, matching, action resolution,
// ledger append, result notification. One physical sensor, one
// synchronous tick at a time: a tick runs to completion before the next
// one is scheduled, so capture-to-append never overlaps itself.

use anyhow::Result;
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::action;
use crate::device::FingerprintDevice;
use crate::ledger::{Action, AttendanceEvent, Ledger, Method};
use crate::matcher::{Capture, Matcher, DEFAULT_THRESHOLD};
use crate::store::{EmployeeStore, Identity, StoreError};

// ============================================================================
// NOTIFICATION SINK
// ============================================================================

/// Outbound channel to the UI/console. Verification outcomes travel here;
/// internal error propagation stays on `Result`.
pub trait NotificationSink {
    fn on_verified(&self, identity: &Identity, action: Action, timestamp: DateTime<Local>);

    fn on_failed(&self, reason: &str, score: f64);
}

// ============================================================================
// SCAN CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Matcher acceptance threshold (0-100)
    pub threshold: f64,

    /// Window after any verification during which captures are ignored
    pub cooldown: Duration,

    /// Tick cadence; drives checking whether cooldown elapsed, not the
    /// cooldown itself
    pub tick: Duration,

    /// Upper bound on one capture call; the sensor must never block past it
    pub capture_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            threshold: DEFAULT_THRESHOLD,
            cooldown: Duration::from_secs(3),
            tick: Duration::from_millis(500),
            capture_timeout: Duration::from_secs(2),
        }
    }
}

// ============================================================================
// STATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Initial state; entered by explicit stop
    Stopped,

    /// Attempting one capture per tick
    Scanning,

    /// Suppressing captures until the cooldown interval elapses
    Cooldown,
}

/// What one tick did. The embedding loop can surface these without
/// reaching into the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Stopped,
    NoFinger,
    CoolingDown,
    Verified { identity_id: String, action: Action },
    Failed { reason: String, score: u32 },
}

// ============================================================================
// SCAN LOOP
// ============================================================================

pub struct ScanLoop {
    store: EmployeeStore,
    ledger: Ledger,
    matcher: Matcher,
    config: ScanConfig,
    state: ScanState,
    cooldown_until: Option<Instant>,
}

impl ScanLoop {
    pub fn new(store: EmployeeStore, ledger: Ledger, config: ScanConfig) -> Self {
        let matcher = Matcher::new(config.threshold);
        ScanLoop {
            store,
            ledger,
            matcher,
            config,
            state: ScanState::Stopped,
            cooldown_until: None,
        }
    }

    /// Swap in a different matching algorithm (the default is a placeholder
    /// sequence ratio, not a vetted biometric matcher).
    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Begin scanning. Also clears any pending cooldown.
    pub fn start(&mut self) {
        self.state = ScanState::Scanning;
        self.cooldown_until = None;
    }

    pub fn stop(&mut self) {
        self.state = ScanState::Stopped;
        self.cooldown_until = None;
    }

    /// One tick of the state machine. Runs at most one capture-to-append
    /// sequence and returns before the next tick is due; combined with the
    /// cooldown window this appends at most one event per physical scan.
    pub fn tick(
        &mut self,
        device: &mut dyn FingerprintDevice,
        sink: &dyn NotificationSink,
        now: Instant,
    ) -> TickOutcome {
        match self.state {
            ScanState::Stopped => return TickOutcome::Stopped,
            ScanState::Cooldown => match self.cooldown_until {
                Some(until) if now < until => return TickOutcome::CoolingDown,
                _ => {
                    // Interval elapsed; resume scanning on this same tick
                    self.state = ScanState::Scanning;
                    self.cooldown_until = None;
                }
            },
            ScanState::Scanning => {}
        }

        let capture = match device.capture(self.config.capture_timeout) {
            Ok(Some(capture)) => capture,
            // No finger present: stay in Scanning, next tick retries
            Ok(None) => return TickOutcome::NoFinger,
            // Device faults are non-fatal: notify and keep scanning
            Err(e) => return self.fail(sink, &e.to_string(), 0.0),
        };

        self.evaluate(capture, sink, now)
    }

    fn evaluate(
        &mut self,
        capture: Capture,
        sink: &dyn NotificationSink,
        now: Instant,
    ) -> TickOutcome {
        let candidates = match self.store.lookup_all() {
            Ok(candidates) => candidates,
            Err(e) => return self.fail(sink, &format!("Error de almacenamiento: {}", e), 0.0),
        };

        let result = self.matcher.identify(&capture, &candidates);

        let identity = match result.identity {
            Some(identity) => identity,
            None => {
                let outcome = self.fail(sink, "Huella no reconocida", result.score);
                self.begin_cooldown(now);
                return outcome;
            }
        };

        let action = match action::next_action_for(&self.ledger, &identity.id) {
            Ok(action) => action,
            Err(e) => {
                let outcome =
                    self.fail(sink, &format!("Error de almacenamiento: {:#}", e), result.score);
                self.begin_cooldown(now);
                return outcome;
            }
        };

        let event = AttendanceEvent::new(&identity, action, Method::Fingerprint);
        if let Err(e) = self.ledger.append(&event) {
            // The event was not recorded; surface it, never drop silently
            let outcome = self.fail(
                sink,
                &format!("No se pudo guardar el registro: {:#}", e),
                result.score,
            );
            self.begin_cooldown(now);
            return outcome;
        }

        sink.on_verified(&identity, action, Local::now());
        self.begin_cooldown(now);

        TickOutcome::Verified {
            identity_id: identity.id,
            action,
        }
    }

    fn fail(&mut self, sink: &dyn NotificationSink, reason: &str, score: f64) -> TickOutcome {
        sink.on_failed(reason, score);
        TickOutcome::Failed {
            reason: reason.to_string(),
            score: score.round() as u32,
        }
    }

    fn begin_cooldown(&mut self, now: Instant) {
        self.state = ScanState::Cooldown;
        self.cooldown_until = Some(now + self.config.cooldown);
    }

    /// Drive the loop on the current thread until `stop_requested` is set.
    /// The flag is checked once per tick, so a stop is observable within one
    /// tick period.
    pub fn run(
        &mut self,
        device: &mut dyn FingerprintDevice,
        sink: &dyn NotificationSink,
        stop_requested: &AtomicBool,
    ) {
        self.start();
        while !stop_requested.load(Ordering::SeqCst) {
            self.tick(device, sink, Instant::now());
            std::thread::sleep(self.config.tick);
        }
        self.stop();
    }
}

// ============================================================================
// MANUAL ACTIONS
// ============================================================================

/// Manual action button: record the next attendance event for an identity
/// without the sensor. Runs the same resolver as the scan path.
pub fn record_manual(
    store: &EmployeeStore,
    ledger: &Ledger,
    identity_id: &str,
) -> Result<AttendanceEvent> {
    let identity = store
        .get(identity_id)?
        .ok_or_else(|| StoreError::NotFound(identity_id.to_string()))?;

    let action = action::next_action_for(ledger, &identity.id)?;
    let event = AttendanceEvent::new(&identity, action, Method::Manual);
    ledger.append(&event)?;

    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::device::SimulatedDevice;
    use crate::matcher::Template;
    use crate::store::Role;
    use std::sync::Mutex;

    // ------------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------------

    #[derive(Default)]
    struct RecordingSink {
        verified: Mutex<Vec<(String, Action)>>,
        failed: Mutex<Vec<(String, u32)>>,
    }

    impl NotificationSink for RecordingSink {
        fn on_verified(&self, identity: &Identity, action: Action, _timestamp: DateTime<Local>) {
            self.verified
                .lock()
                .unwrap()
                .push((identity.id.clone(), action));
        }

        fn on_failed(&self, reason: &str, score: f64) {
            self.failed
                .lock()
                .unwrap()
                .push((reason.to_string(), score.round() as u32));
        }
    }

    fn fixture() -> (EmployeeStore, Ledger, ScanLoop) {
        let db = Database::open_in_memory().unwrap();
        let store = EmployeeStore::new(db.clone());
        let ledger = Ledger::new(db);
        let scan = ScanLoop::new(store.clone(), ledger.clone(), ScanConfig::default());
        (store, ledger, scan)
    }

    fn enroll_ana(store: &EmployeeStore) -> Template {
        let template = Template::from_bytes(vec![42u8; 64]);
        store
            .add(&Identity::new("A-1", "Ana Soto", Role::Docente))
            .unwrap();
        store.set_template("A-1", &template).unwrap();
        template
    }

    // ------------------------------------------------------------------------
    // Scenarios
    // ------------------------------------------------------------------------

    #[test]
    fn test_verified_scan_appends_entry_then_cooldown_debounces() {
        let (store, ledger, mut scan) = fixture();
        let template = enroll_ana(&store);

        let mut device = SimulatedDevice::new();
        device.push_finger(template.clone());
        device.push_finger(template.clone());
        let sink = RecordingSink::default();

        scan.start();
        let t0 = Instant::now();

        // First placement: verified, action=Entry, one event appended
        let outcome = scan.tick(&mut device, &sink, t0);
        assert_eq!(
            outcome,
            TickOutcome::Verified {
                identity_id: "A-1".to_string(),
                action: Action::Entry,
            }
        );
        assert_eq!(ledger.count().unwrap(), 1);
        assert_eq!(scan.state(), ScanState::Cooldown);

        // 1 second later, still inside the 3s cooldown: no capture attempted,
        // no new event
        let outcome = scan.tick(&mut device, &sink, t0 + Duration::from_secs(1));
        assert_eq!(outcome, TickOutcome::CoolingDown);
        assert_eq!(ledger.count().unwrap(), 1);
        assert_eq!(device.remaining(), 1);

        // 4 seconds later: cooldown elapsed, second placement records Break
        let outcome = scan.tick(&mut device, &sink, t0 + Duration::from_secs(4));
        assert_eq!(
            outcome,
            TickOutcome::Verified {
                identity_id: "A-1".to_string(),
                action: Action::Break,
            }
        );
        assert_eq!(ledger.count().unwrap(), 2);

        let events = ledger.events_for("A-1").unwrap();
        assert_eq!(events[0].action, Action::Entry);
        assert_eq!(events[1].action, Action::Break);
        assert!(events.iter().all(|e| e.method == Method::Fingerprint));

        let verified = sink.verified.lock().unwrap();
        assert_eq!(verified.len(), 2);
        assert_eq!(verified[0], ("A-1".to_string(), Action::Entry));
    }

    #[test]
    fn test_unenrolled_capture_fails_and_appends_nothing() {
        let (store, ledger, mut scan) = fixture();
        enroll_ana(&store);

        let mut device = SimulatedDevice::new();
        device.push_finger(Template::from_bytes(vec![200u8; 64]));
        let sink = RecordingSink::default();

        scan.start();
        let outcome = scan.tick(&mut device, &sink, Instant::now());

        match outcome {
            TickOutcome::Failed { reason, score } => {
                assert_eq!(reason, "Huella no reconocida");
                assert!((score as f64) < DEFAULT_THRESHOLD);
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert_eq!(ledger.count().unwrap(), 0);
        assert_eq!(sink.failed.lock().unwrap().len(), 1);
        // Failed verification also debounces
        assert_eq!(scan.state(), ScanState::Cooldown);
    }

    #[test]
    fn test_empty_sensor_keeps_scanning() {
        let (_store, ledger, mut scan) = fixture();

        let mut device = SimulatedDevice::new();
        let sink = RecordingSink::default();

        scan.start();
        let outcome = scan.tick(&mut device, &sink, Instant::now());

        assert_eq!(outcome, TickOutcome::NoFinger);
        assert_eq!(scan.state(), ScanState::Scanning);
        assert_eq!(ledger.count().unwrap(), 0);
    }

    #[test]
    fn test_device_fault_is_non_fatal() {
        let (store, ledger, mut scan) = fixture();
        let template = enroll_ana(&store);

        let mut device = SimulatedDevice::new();
        device.push_fault("sensor desconectado");
        device.push_finger(template);
        let sink = RecordingSink::default();

        scan.start();
        let t0 = Instant::now();

        // Fault tick: failed notification, loop stays in Scanning
        let outcome = scan.tick(&mut device, &sink, t0);
        assert!(matches!(outcome, TickOutcome::Failed { .. }));
        assert_eq!(scan.state(), ScanState::Scanning);

        // Next tick recovers and verifies normally
        let outcome = scan.tick(&mut device, &sink, t0 + Duration::from_millis(500));
        assert!(matches!(outcome, TickOutcome::Verified { .. }));
        assert_eq!(ledger.count().unwrap(), 1);
    }

    #[test]
    fn test_stopped_loop_never_touches_the_sensor() {
        let (store, ledger, mut scan) = fixture();
        let template = enroll_ana(&store);

        let mut device = SimulatedDevice::new();
        device.push_finger(template);
        let sink = RecordingSink::default();

        // Initial state is Stopped; no start() was issued
        let outcome = scan.tick(&mut device, &sink, Instant::now());
        assert_eq!(outcome, TickOutcome::Stopped);
        assert_eq!(device.remaining(), 1);
        assert_eq!(ledger.count().unwrap(), 0);
    }

    #[test]
    fn test_start_resets_cooldown() {
        let (store, ledger, mut scan) = fixture();
        let template = enroll_ana(&store);

        let mut device = SimulatedDevice::new();
        device.push_finger(template.clone());
        device.push_finger(template);
        let sink = RecordingSink::default();

        scan.start();
        let t0 = Instant::now();
        scan.tick(&mut device, &sink, t0);
        assert_eq!(scan.state(), ScanState::Cooldown);

        // Stop/start cycle clears the pending cooldown window
        scan.stop();
        scan.start();
        let outcome = scan.tick(&mut device, &sink, t0 + Duration::from_millis(100));
        assert!(matches!(outcome, TickOutcome::Verified { .. }));
        assert_eq!(ledger.count().unwrap(), 2);
    }

    #[test]
    fn test_run_stops_within_a_tick() {
        let (_store, _ledger, mut scan) = fixture();
        let config = ScanConfig {
            tick: Duration::from_millis(5),
            ..ScanConfig::default()
        };
        scan.config = config;

        let stop = AtomicBool::new(true);
        let mut device = SimulatedDevice::new();
        let sink = RecordingSink::default();

        // Flag already raised: run must return immediately and leave the
        // machine stopped
        scan.run(&mut device, &sink, &stop);
        assert_eq!(scan.state(), ScanState::Stopped);
    }

    // ------------------------------------------------------------------------
    // Manual actions
    // ------------------------------------------------------------------------

    #[test]
    fn test_record_manual_cycles_like_the_scan_path() {
        let (store, ledger, _scan) = fixture();
        enroll_ana(&store);

        let first = record_manual(&store, &ledger, "A-1").unwrap();
        assert_eq!(first.action, Action::Entry);
        assert_eq!(first.method, Method::Manual);

        let second = record_manual(&store, &ledger, "A-1").unwrap();
        assert_eq!(second.action, Action::Break);
        assert_eq!(ledger.count().unwrap(), 2);
    }

    #[test]
    fn test_record_manual_unknown_identity_fails() {
        let (store, ledger, _scan) = fixture();

        let err = record_manual(&store, &ledger, "Z-9").unwrap_err();
        assert!(err.downcast_ref::<StoreError>().is_some());
        assert_eq!(ledger.count().unwrap(), 0);
    }
}
