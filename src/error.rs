use crate::link::LinkReturn;

/// Unified error type for bring-up and acquisition.
///
/// Configuration and link failures are fatal to the operation that raised
/// them; calibration failures refuse activation of one device but leave the
/// rest of the session alive. Validation problems that the hardware tolerates
/// (shift-register verify mismatch, odd electrode selections) are not errors
/// at all and go through `log::warn!` instead.
#[derive(Debug, thiserror::Error)]
pub enum DaqError {
    #[error("link transaction failed: {0:?}")]
    Link(LinkReturn),

    #[error("device configuration failed: {0}")]
    FatalConfig(String),

    #[error("calibration rejected: {0}")]
    Calibration(String),

    #[error("acquisition stopped by link: {0:?}")]
    AcquisitionStopped(LinkReturn),
}

impl From<LinkReturn> for DaqError {
    fn from(value: LinkReturn) -> Self {
        DaqError::Link(value)
    }
}

impl DaqError {
    /// Whether the error aborts its whole operation (as opposed to refusing
    /// activation of a single device).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DaqError::Calibration(_))
    }
}

pub type DaqResult<T> = Result<T, DaqError>;
