//! Bootloader command and status codes.
//!
//! The bootloader protocol is a binary request/response protocol with the
//! following structure (all integers little-endian):
//! - Request: `[address][command][len][payload...][crc8]`
//! - Response: `[address][command echo][status][len][payload...][crc8]`
//!
//! A packet never exceeds 255 bytes, which caps request payloads at 251
//! bytes and response payloads at 250. Flash-data commands reserve the
//! first 4 payload bytes for a 32-bit offset, leaving 247 bytes of data
//! per frame.
//!
//! Command codes are fixed integration points shared with the puppy
//! bootloaders and must never be renumbered. A handful of codes were
//! retired over the protocol's lifetime and must not be reissued.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(static_mut_refs)]

/// Protocol version spoken by this controller. Only the high (major) byte
/// is checked for compatibility; minor mismatches are tolerated.
pub const BOOTLOADER_PROTOCOL_VERSION: u16 = 0x0302;

/// Hard ceiling on a whole packet, request or response.
pub const MAX_PACKET_LENGTH: usize = 255;

/// Request framing overhead: address, command, length, CRC.
pub const REQUEST_OVERHEAD: usize = 4;

/// Response framing overhead: address, command echo, status, length, CRC.
pub const RESPONSE_OVERHEAD: usize = 5;

/// Maximum payload bytes in a single request frame.
pub const MAX_REQUEST_DATA_LEN: usize = MAX_PACKET_LENGTH - REQUEST_OVERHEAD;

/// Maximum payload bytes in a single response frame.
pub const MAX_RESPONSE_DATA_LEN: usize = MAX_PACKET_LENGTH - RESPONSE_OVERHEAD;

/// Flash-data commands carry a 32-bit offset ahead of the data bytes.
pub const MAX_FLASH_BLOCK_LEN: usize = MAX_REQUEST_DATA_LEN - 4;

/// Size of a firmware fingerprint digest.
pub const FINGERPRINT_SIZE: usize = 32;

/// Command codes understood by puppy bootloaders.
///
/// Gaps in the numbering are retired codes; see [`CommandCode::is_retired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCode {
    GetProtocolVersion,
    SetAddress,
    GetHardwareInfo,
    StartApplication,
    WriteFlash,
    FinalizeFlash,
    ReadFlash,
    GetMaxPacketLength,
    GetFingerprint,
    ComputeFingerprint,
    ReadOtp,
}

impl CommandCode {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0x00 => Some(Self::GetProtocolVersion),
            0x01 => Some(Self::SetAddress),
            0x03 => Some(Self::GetHardwareInfo),
            0x05 => Some(Self::StartApplication),
            0x06 => Some(Self::WriteFlash),
            0x07 => Some(Self::FinalizeFlash),
            0x08 => Some(Self::ReadFlash),
            0x0C => Some(Self::GetMaxPacketLength),
            0x0E => Some(Self::GetFingerprint),
            0x0F => Some(Self::ComputeFingerprint),
            0x10 => Some(Self::ReadOtp),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::GetProtocolVersion => 0x00,
            Self::SetAddress => 0x01,
            Self::GetHardwareInfo => 0x03,
            Self::StartApplication => 0x05,
            Self::WriteFlash => 0x06,
            Self::FinalizeFlash => 0x07,
            Self::ReadFlash => 0x08,
            Self::GetMaxPacketLength => 0x0C,
            Self::GetFingerprint => 0x0E,
            Self::ComputeFingerprint => 0x0F,
            Self::ReadOtp => 0x10,
        }
    }

    /// Codes that were once assigned and must never carry a new meaning.
    pub fn is_retired(val: u8) -> bool {
        matches!(val, 0x02 | 0x04 | 0x09 | 0x0A | 0x0B | 0x0D | 0x44 | 0x46)
    }

    /// SET_ADDRESS is broadcast while several puppies may share an address,
    /// so it is the one command that never gets a reply.
    pub fn expects_response(self) -> bool {
        !matches!(self, Self::SetAddress)
    }
}

/// Status codes a puppy can return over the wire.
///
/// Locally synthesized failures (no response, truncated response, ...) are
/// not part of this set; they never appear in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    CommandOk,
    CommandFailed,
    CommandNotSupported,
    InvalidTransfer,
    InvalidCrc,
    InvalidArguments,
}

impl ResponseStatus {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0x00 => Some(Self::CommandOk),
            0x01 => Some(Self::CommandFailed),
            0x02 => Some(Self::CommandNotSupported),
            0x03 => Some(Self::InvalidTransfer),
            0x04 => Some(Self::InvalidCrc),
            0x05 => Some(Self::InvalidArguments),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::CommandOk => 0x00,
            Self::CommandFailed => 0x01,
            Self::CommandNotSupported => 0x02,
            Self::InvalidTransfer => 0x03,
            Self::InvalidCrc => 0x04,
            Self::InvalidArguments => 0x05,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_code_roundtrip() {
        let codes = [
            CommandCode::GetProtocolVersion,
            CommandCode::SetAddress,
            CommandCode::GetHardwareInfo,
            CommandCode::StartApplication,
            CommandCode::WriteFlash,
            CommandCode::FinalizeFlash,
            CommandCode::ReadFlash,
            CommandCode::GetMaxPacketLength,
            CommandCode::GetFingerprint,
            CommandCode::ComputeFingerprint,
            CommandCode::ReadOtp,
        ];

        for code in codes {
            assert_eq!(CommandCode::from_u8(code.to_u8()), Some(code));
        }
    }

    #[test]
    fn test_retired_codes_never_decode() {
        for val in [0x02u8, 0x04, 0x09, 0x0A, 0x0B, 0x0D, 0x44, 0x46] {
            assert!(CommandCode::is_retired(val));
            assert_eq!(CommandCode::from_u8(val), None);
        }
    }

    #[test]
    fn test_live_codes_are_not_retired() {
        for val in 0u8..=0xFF {
            if CommandCode::from_u8(val).is_some() {
                assert!(!CommandCode::is_retired(val));
            }
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for val in 0u8..=0x05 {
            let status = ResponseStatus::from_u8(val).expect("status in range");
            assert_eq!(status.to_u8(), val);
        }
        assert_eq!(ResponseStatus::from_u8(0x06), None);
    }

    #[test]
    fn test_only_set_address_skips_reply() {
        assert!(!CommandCode::SetAddress.expects_response());
        assert!(CommandCode::GetProtocolVersion.expects_response());
        assert!(CommandCode::WriteFlash.expects_response());
    }

    #[test]
    fn test_size_ceilings() {
        assert_eq!(MAX_REQUEST_DATA_LEN, 251);
        assert_eq!(MAX_RESPONSE_DATA_LEN, 250);
        assert_eq!(MAX_FLASH_BLOCK_LEN, 247);
    }
}
