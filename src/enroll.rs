// Enrollment Flow - bind a captured template to an existing employee
// Enrollment never creates employees; the record must already be in the
// store. Exactly one template is captured per invocation, and the caller
// guides repeated attempts if the sensor rejects the sample.

use std::fmt;
use std::time::Duration;

use crate::device::{DeviceError, FingerprintDevice};
use crate::matcher::Template;
use crate::store::{EmployeeStore, StoreError};

#[derive(Debug)]
pub enum EnrollError {
    /// The identity is not in the store
    NotFound(String),

    /// The capture window elapsed with no finger placed
    NoCapture,

    Device(DeviceError),

    Store(StoreError),
}

impl fmt::Display for EnrollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrollError::NotFound(id) => write!(f, "Identity not found: {}", id),
            EnrollError::NoCapture => write!(f, "No finger placed on the reader"),
            EnrollError::Device(e) => write!(f, "{}", e),
            EnrollError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EnrollError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EnrollError::Device(e) => Some(e),
            EnrollError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeviceError> for EnrollError {
    fn from(e: DeviceError) -> Self {
        EnrollError::Device(e)
    }
}

impl From<StoreError> for EnrollError {
    fn from(e: StoreError) -> Self {
        EnrollError::Store(e)
    }
}

/// Capture one template and bind it to `identity_id`, overwriting any
/// previously enrolled template. Returns the stored template so the caller
/// can show its digest.
pub fn enroll(
    store: &EmployeeStore,
    device: &mut dyn FingerprintDevice,
    identity_id: &str,
    capture_timeout: Duration,
) -> Result<Template, EnrollError> {
    // Validate the identity before touching the sensor
    if store.get(identity_id)?.is_none() {
        return Err(EnrollError::NotFound(identity_id.to_string()));
    }

    let capture = device
        .capture(capture_timeout)?
        .ok_or(EnrollError::NoCapture)?;

    store.set_template(identity_id, &capture.template)?;
    Ok(capture.template)
}
