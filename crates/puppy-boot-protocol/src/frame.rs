//! Request/response framing and CRC-8 integrity checking.
//!
//! Frames are CRC-protected with CRC-8 (polynomial 0x07, MSB-first,
//! initial value 0x00) computed over every byte preceding the CRC. The
//! response echoes the request's command code so the master can discard
//! stale replies on the half-duplex bus.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(static_mut_refs)]

use crate::commands::{
    CommandCode, MAX_REQUEST_DATA_LEN, MAX_RESPONSE_DATA_LEN, ResponseStatus,
};
use crate::error::{ProtocolError, ProtocolResult};

/// Bytes of a request frame before the payload: address, command, length.
pub const REQUEST_HEADER_LEN: usize = 3;

/// Bytes of a response frame before the payload: address, command echo,
/// status, length.
pub const RESPONSE_HEADER_LEN: usize = 4;

/// CRC-8, polynomial 0x07, MSB-first, init 0x00.
pub fn compute_crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0x00;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ 0x07;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Bytes still to read once a response header is in: payload plus CRC.
pub fn response_remaining(len_byte: u8) -> usize {
    len_byte as usize + 1
}

/// A decoded response frame, borrowing its payload from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response<'a> {
    pub address: u8,
    pub command: CommandCode,
    pub status: ResponseStatus,
    pub payload: &'a [u8],
}

pub fn encode_request(
    address: u8,
    command: CommandCode,
    payload: &[u8],
    out: &mut [u8],
) -> ProtocolResult<usize> {
    if payload.len() > MAX_REQUEST_DATA_LEN {
        return Err(ProtocolError::PayloadTooLong {
            max: MAX_REQUEST_DATA_LEN,
            actual: payload.len(),
        });
    }
    let total = REQUEST_HEADER_LEN + payload.len() + 1;
    if out.len() < total {
        return Err(ProtocolError::BufferTooSmall {
            needed: total,
            actual: out.len(),
        });
    }

    out[0] = address;
    out[1] = command.to_u8();
    out[2] = payload.len() as u8;
    out[REQUEST_HEADER_LEN..REQUEST_HEADER_LEN + payload.len()].copy_from_slice(payload);
    out[total - 1] = compute_crc8(&out[..total - 1]);

    Ok(total)
}

/// Decode a request frame. Used by device-side tooling and the test
/// fleet simulator; the controller only ever encodes requests.
pub fn decode_request(data: &[u8]) -> ProtocolResult<(u8, CommandCode, &[u8])> {
    if data.len() < REQUEST_HEADER_LEN + 1 {
        return Err(ProtocolError::Truncated {
            expected: REQUEST_HEADER_LEN + 1,
            actual: data.len(),
        });
    }

    let declared = data[2] as usize;
    let total = REQUEST_HEADER_LEN + declared + 1;
    if data.len() != total {
        return Err(ProtocolError::LengthMismatch {
            declared,
            actual: data.len(),
        });
    }

    let computed = compute_crc8(&data[..total - 1]);
    let received = data[total - 1];
    if computed != received {
        return Err(ProtocolError::CrcMismatch { computed, received });
    }

    let command = decode_command_byte(data[1])?;
    Ok((data[0], command, &data[REQUEST_HEADER_LEN..total - 1]))
}

pub fn encode_response(
    address: u8,
    command: CommandCode,
    status: ResponseStatus,
    payload: &[u8],
    out: &mut [u8],
) -> ProtocolResult<usize> {
    if payload.len() > MAX_RESPONSE_DATA_LEN {
        return Err(ProtocolError::PayloadTooLong {
            max: MAX_RESPONSE_DATA_LEN,
            actual: payload.len(),
        });
    }
    let total = RESPONSE_HEADER_LEN + payload.len() + 1;
    if out.len() < total {
        return Err(ProtocolError::BufferTooSmall {
            needed: total,
            actual: out.len(),
        });
    }

    out[0] = address;
    out[1] = command.to_u8();
    out[2] = status.to_u8();
    out[3] = payload.len() as u8;
    out[RESPONSE_HEADER_LEN..RESPONSE_HEADER_LEN + payload.len()].copy_from_slice(payload);
    out[total - 1] = compute_crc8(&out[..total - 1]);

    Ok(total)
}

pub fn decode_response(data: &[u8]) -> ProtocolResult<Response<'_>> {
    if data.len() < RESPONSE_HEADER_LEN + 1 {
        return Err(ProtocolError::Truncated {
            expected: RESPONSE_HEADER_LEN + 1,
            actual: data.len(),
        });
    }

    let declared = data[3] as usize;
    let total = RESPONSE_HEADER_LEN + declared + 1;
    if data.len() != total {
        return Err(ProtocolError::LengthMismatch {
            declared,
            actual: data.len(),
        });
    }

    let computed = compute_crc8(&data[..total - 1]);
    let received = data[total - 1];
    if computed != received {
        return Err(ProtocolError::CrcMismatch { computed, received });
    }

    let command = decode_command_byte(data[1])?;
    let status = ResponseStatus::from_u8(data[2]).ok_or(ProtocolError::UnknownStatus(data[2]))?;

    Ok(Response {
        address: data[0],
        command,
        status,
        payload: &data[RESPONSE_HEADER_LEN..total - 1],
    })
}

fn decode_command_byte(val: u8) -> ProtocolResult<CommandCode> {
    if CommandCode::is_retired(val) {
        return Err(ProtocolError::RetiredCommand(val));
    }
    CommandCode::from_u8(val).ok_or(ProtocolError::UnknownCommand(val))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::MAX_PACKET_LENGTH;

    #[test]
    fn test_request_roundtrip() {
        let mut buf = [0u8; MAX_PACKET_LENGTH];
        let len = encode_request(0x0A, CommandCode::GetHardwareInfo, &[], &mut buf)
            .expect("encode failed");
        assert_eq!(len, 4);

        let (address, command, payload) = decode_request(&buf[..len]).expect("decode failed");
        assert_eq!(address, 0x0A);
        assert_eq!(command, CommandCode::GetHardwareInfo);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_request_max_payload_fills_packet() {
        let payload = [0x5Au8; MAX_REQUEST_DATA_LEN];
        let mut buf = [0u8; MAX_PACKET_LENGTH];
        let len = encode_request(0x0B, CommandCode::WriteFlash, &payload, &mut buf)
            .expect("encode failed");
        assert_eq!(len, MAX_PACKET_LENGTH);
    }

    #[test]
    fn test_request_payload_over_ceiling_rejected() {
        let payload = [0u8; MAX_REQUEST_DATA_LEN + 1];
        let mut buf = [0u8; MAX_PACKET_LENGTH + 8];
        let result = encode_request(0x0A, CommandCode::WriteFlash, &payload, &mut buf);
        assert!(matches!(result, Err(ProtocolError::PayloadTooLong { .. })));
    }

    #[test]
    fn test_response_roundtrip() {
        let mut buf = [0u8; MAX_PACKET_LENGTH];
        let len = encode_response(
            0x0A,
            CommandCode::GetProtocolVersion,
            ResponseStatus::CommandOk,
            &[0x02, 0x03],
            &mut buf,
        )
        .expect("encode failed");
        assert_eq!(len, 7);

        let response = decode_response(&buf[..len]).expect("decode failed");
        assert_eq!(response.address, 0x0A);
        assert_eq!(response.command, CommandCode::GetProtocolVersion);
        assert_eq!(response.status, ResponseStatus::CommandOk);
        assert_eq!(response.payload, &[0x02, 0x03]);
    }

    #[test]
    fn test_corrupt_crc_rejected() {
        let mut buf = [0u8; MAX_PACKET_LENGTH];
        let len = encode_response(
            0x0A,
            CommandCode::GetFingerprint,
            ResponseStatus::CommandOk,
            &[1, 2, 3, 4],
            &mut buf,
        )
        .expect("encode failed");
        buf[len - 1] ^= 0xFF;
        assert!(matches!(
            decode_response(&buf[..len]),
            Err(ProtocolError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_retired_command_in_frame_rejected() {
        // Hand-build a frame carrying retired code 0x44 with a valid CRC.
        let mut buf = [0u8; 8];
        buf[0] = 0x0A;
        buf[1] = 0x44;
        buf[2] = 0;
        buf[3] = compute_crc8(&buf[..3]);
        assert_eq!(
            decode_request(&buf[..4]),
            Err(ProtocolError::RetiredCommand(0x44))
        );
    }

    #[test]
    fn test_unknown_status_rejected() {
        let mut buf = [0u8; 8];
        buf[0] = 0x0A;
        buf[1] = CommandCode::GetProtocolVersion.to_u8();
        buf[2] = 0x77;
        buf[3] = 0;
        buf[4] = compute_crc8(&buf[..4]);
        assert_eq!(
            decode_response(&buf[..5]),
            Err(ProtocolError::UnknownStatus(0x77))
        );
    }

    #[test]
    fn test_length_field_mismatch_rejected() {
        let mut buf = [0u8; MAX_PACKET_LENGTH];
        let len = encode_request(0x0A, CommandCode::ReadFlash, &[0, 0, 0, 0, 16], &mut buf)
            .expect("encode failed");
        assert!(matches!(
            decode_request(&buf[..len - 1]),
            Err(ProtocolError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_response_remaining() {
        assert_eq!(response_remaining(0), 1);
        assert_eq!(response_remaining(250), 251);
    }
}
