// Reloj Control - attendance time-clock core
// Exposes all modules for use in the CLI and tests

pub mod db;
pub mod store;     // Template Store - employee roster + enrolled templates
pub mod matcher;   // Biometric verification under a similarity threshold
pub mod ledger;    // Append-only attendance ledger
pub mod action;    // Entry/Break/Exit resolver
pub mod device;    // Capability boundary to the fingerprint sensor
pub mod scanner;   // Scan loop state machine + manual actions
pub mod enroll;    // Enrollment flow
pub mod config;    // JSON system configuration

// Re-export commonly used types
pub use db::{setup_database, Database};
pub use store::{EmployeeStore, Identity, Role, StoreError};
pub use matcher::{
    Capture, MatchResult, Matcher, SequenceRatio, Similarity, Template, DEFAULT_THRESHOLD,
};
pub use ledger::{Action, AttendanceEvent, Ledger, Method, RecordFilter};
pub use action::{next_action, next_action_for};
pub use device::{DeviceError, FingerprintDevice, SimulatedDevice};
pub use scanner::{
    record_manual, NotificationSink, ScanConfig, ScanLoop, ScanState, TickOutcome,
};
pub use enroll::{enroll, EnrollError};
pub use config::AppConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
