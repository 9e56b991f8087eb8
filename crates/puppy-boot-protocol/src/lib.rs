//! Puppy bootloader serial protocol: framing, command codes, and typed payloads.
//!
//! This crate is intentionally I/O-free. It provides pure functions and types
//! for the half-duplex request/response protocol spoken to satellite boards
//! ("puppies") while they are still in their bootloaders, so the wire layer
//! can be tested and fuzzed without a serial port.
//!
//! # Key Features
//! - Command and status code enumerations with retired-code rejection
//! - Request/response framing with CRC-8 integrity checking
//! - Bootloader- and application-phase address range helpers
//! - Typed payload encoding/decoding (hardware info, fingerprints, flash I/O)

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(static_mut_refs)]

pub mod address;
pub mod commands;
pub mod error;
pub mod frame;
pub mod payload;

pub use address::{Address, MAX_DOCK_COUNT};
pub use commands::{
    BOOTLOADER_PROTOCOL_VERSION, CommandCode, FINGERPRINT_SIZE, MAX_FLASH_BLOCK_LEN,
    MAX_PACKET_LENGTH, MAX_REQUEST_DATA_LEN, MAX_RESPONSE_DATA_LEN, REQUEST_OVERHEAD,
    RESPONSE_OVERHEAD, ResponseStatus,
};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{
    REQUEST_HEADER_LEN, RESPONSE_HEADER_LEN, Response, compute_crc8, decode_request,
    decode_response, encode_request, encode_response, response_remaining,
};
pub use payload::{
    HW_INFO_LEN, HwInfo, OTP_DATAMATRIX_LEN, OtpDatamatrix, RUN_APP_PAYLOAD_LEN,
    build_flash_read_payload, build_get_fingerprint_payload, build_run_app_payload,
    build_salt_payload, encode_hw_info, parse_hw_info, parse_otp_datamatrix,
    parse_protocol_version, parse_u16_le,
};
