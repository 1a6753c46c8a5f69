//! APDU framing for the FIDO applet.
//!
//! The applet doesn't speak plain ISO 7816-4 cases: every command goes out
//! as the vendor envelope `80 10 80 00 <len>`, followed by a one-byte
//! command selector and the encoded payload. Replies trail the usual
//! SW1/SW2 status word, with `61 xx` asking us to fetch the rest of a large
//! reply via GET RESPONSE.

use crate::{Error, Result};

/// CLA/INS/P1/P2 of the command envelope. P1=0x80 marks the frame as a
/// whole command rather than a continuation.
pub const COMMAND_HEADER: [u8; 4] = [0x80, 0x10, 0x80, 0x00];

/// SELECT for the FIDO applet, AID `A0 00 00 06 47 2F 00 01`.
pub const APPLET_SELECT: [u8; 13] = [
    0x00, 0xA4, 0x04, 0x00, 0x08, 0xA0, 0x00, 0x00, 0x06, 0x47, 0x2F, 0x00, 0x01,
];

/// Longest payload that fits a single frame; the length field is one byte
/// and outbound chaining is not implemented.
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Outcome of one transport round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 0x90xx: done, the accumulated body is the whole reply.
    Ok,

    /// 0x61xx: xx more bytes are waiting; fetch them with GET RESPONSE.
    MoreData(u8),

    /// Everything else. SW1/SW2 are kept verbatim for reporting.
    Failed(u8, u8),
}

impl Status {
    pub fn classify(sw1: u8, sw2: u8) -> Self {
        match (sw1, sw2) {
            (0x90, _) => Self::Ok,
            (0x61, xx) => Self::MoreData(xx),
            (sw1, sw2) => Self::Failed(sw1, sw2),
        }
    }
}

/// Splits a raw reply into its body and the classified status word.
pub fn split_reply(rsp: &[u8]) -> Result<(&[u8], Status)> {
    if rsp.len() < 2 {
        return Err(Error::ReplyTooShort(rsp.len()));
    }
    let (body, sw) = rsp.split_at(rsp.len() - 2);
    Ok((body, Status::classify(sw[0], sw[1])))
}

/// Frames a command selector and its encoded payload into an APDU.
///
/// The length byte counts the payload only; the selector rides between the
/// header and the payload, uncounted.
pub fn frame_command(selector: u8, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::PayloadTooLarge(payload.len()));
    }
    let mut apdu = Vec::with_capacity(COMMAND_HEADER.len() + 2 + payload.len());
    apdu.extend_from_slice(&COMMAND_HEADER);
    apdu.push(payload.len() as u8);
    apdu.push(selector);
    apdu.extend_from_slice(payload);
    Ok(apdu)
}

/// GET RESPONSE, asking for the next `n` chained bytes.
pub fn get_response(n: u8) -> [u8; 5] {
    [0x00, 0xC0, 0x00, 0x00, n]
}
