//! Wire-layer error types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Frame too short: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Output buffer too small: need {needed} bytes, have {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("Payload too long: {actual} bytes exceeds ceiling of {max}")]
    PayloadTooLong { max: usize, actual: usize },

    #[error("CRC mismatch: computed {computed:#04x}, frame carries {received:#04x}")]
    CrcMismatch { computed: u8, received: u8 },

    #[error("Retired command code {0:#04x} must not be reissued")]
    RetiredCommand(u8),

    #[error("Unknown command code: {0:#04x}")]
    UnknownCommand(u8),

    #[error("Unknown status code: {0:#04x}")]
    UnknownStatus(u8),

    #[error("Frame length field {declared} disagrees with frame size {actual}")]
    LengthMismatch { declared: usize, actual: usize },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::CrcMismatch {
            computed: 0xAB,
            received: 0xCD,
        };
        assert_eq!(
            err.to_string(),
            "CRC mismatch: computed 0xab, frame carries 0xcd"
        );
    }

    #[test]
    fn test_error_is_std_error() {
        let err = ProtocolError::RetiredCommand(0x44);
        let _: &dyn std::error::Error = &err;
    }
}
