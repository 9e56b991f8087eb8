//! Typed payload encoding and decoding for the bootloader commands.
//!
//! All integers are little-endian on the wire.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(static_mut_refs)]

use crate::commands::FINGERPRINT_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

/// Wire size of a GET_HARDWARE_INFO response payload.
pub const HW_INFO_LEN: usize = 8;

/// Wire size of a START_APPLICATION request payload: salt plus fingerprint.
pub const RUN_APP_PAYLOAD_LEN: usize = 4 + FINGERPRINT_SIZE;

/// Size of the raw OTP area holding the hardware datamatrix.
pub const OTP_DATAMATRIX_LEN: usize = 32;

/// Hardware identity a puppy reports about itself. Validated by the
/// bootstrap orchestrator, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwInfo {
    pub hw_type: u8,
    pub hw_revision: u8,
    /// Bootloader version, same major/minor split as the protocol version.
    pub bl_version: u16,
    /// Application flash capacity in bytes.
    pub application_size: u32,
}

pub fn parse_hw_info(payload: &[u8]) -> ProtocolResult<HwInfo> {
    if payload.len() < HW_INFO_LEN {
        return Err(ProtocolError::Truncated {
            expected: HW_INFO_LEN,
            actual: payload.len(),
        });
    }

    Ok(HwInfo {
        hw_type: payload[0],
        hw_revision: payload[1],
        bl_version: u16::from_le_bytes([payload[2], payload[3]]),
        application_size: u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
    })
}

pub fn encode_hw_info(info: &HwInfo) -> [u8; HW_INFO_LEN] {
    let mut out = [0u8; HW_INFO_LEN];
    out[0] = info.hw_type;
    out[1] = info.hw_revision;
    out[2..4].copy_from_slice(&info.bl_version.to_le_bytes());
    out[4..8].copy_from_slice(&info.application_size.to_le_bytes());
    out
}

/// GET_PROTOCOL_VERSION response: a single u16.
pub fn parse_protocol_version(payload: &[u8]) -> ProtocolResult<u16> {
    parse_u16_le(payload)
}

pub fn parse_u16_le(payload: &[u8]) -> ProtocolResult<u16> {
    if payload.len() < 2 {
        return Err(ProtocolError::Truncated {
            expected: 2,
            actual: payload.len(),
        });
    }
    Ok(u16::from_le_bytes([payload[0], payload[1]]))
}

/// COMPUTE_FINGERPRINT carries the session salt.
pub fn build_salt_payload(salt: u32) -> [u8; 4] {
    salt.to_le_bytes()
}

/// GET_FINGERPRINT asks for a sub-range of the 32-byte digest.
pub fn build_get_fingerprint_payload(offset: u8, size: u8) -> [u8; 2] {
    [offset, size]
}

/// READ_FLASH / READ_OTP: 32-bit offset plus requested byte count.
pub fn build_flash_read_payload(offset: u32, len: u8) -> [u8; 5] {
    let mut out = [0u8; 5];
    out[..4].copy_from_slice(&offset.to_le_bytes());
    out[4] = len;
    out
}

/// START_APPLICATION: the last trusted salt and fingerprint, re-checked
/// by the puppy's own bootloader before it jumps.
pub fn build_run_app_payload(
    salt: u32,
    fingerprint: &[u8; FINGERPRINT_SIZE],
) -> [u8; RUN_APP_PAYLOAD_LEN] {
    let mut out = [0u8; RUN_APP_PAYLOAD_LEN];
    out[..4].copy_from_slice(&salt.to_le_bytes());
    out[4..].copy_from_slice(fingerprint);
    out
}

/// Hardware identity written into a puppy's OTP at manufacturing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OtpDatamatrix {
    pub product_id: u16,
    pub revision: u8,
}

/// Parse the datamatrix string from a raw OTP dump.
///
/// The OTP area starts with an ASCII `PPPPP-RR` code (5-digit product id,
/// 2-digit revision). Boards flashed before the datamatrix was introduced
/// read back erased (0xFF) and yield `None`.
pub fn parse_otp_datamatrix(otp: &[u8]) -> Option<OtpDatamatrix> {
    if otp.len() < 8 {
        return None;
    }

    let product: &str = std::str::from_utf8(&otp[..5]).ok()?;
    if otp[5] != b'-' {
        return None;
    }
    let revision: &str = std::str::from_utf8(&otp[6..8]).ok()?;

    Some(OtpDatamatrix {
        product_id: product.parse().ok()?,
        revision: revision.parse().ok()?,
    })
}
