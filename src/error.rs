use thiserror::Error;

/// Failure modes at the device API boundary.
///
/// `Status` and `Transport` both mean the operation did not happen; `Parse`
/// means the device answered with something we could not read. Callers treat
/// all three as "abandon and report", but the status line wording differs.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device returned status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unparseable device response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl DeviceError {
    /// Status code for user-facing messages; transport failures report 0,
    /// matching the device UI convention for "no response at all".
    pub fn status_code(&self) -> u16 {
        match self {
            DeviceError::Status(code) => *code,
            _ => 0,
        }
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, DeviceError::Parse(_))
    }
}
