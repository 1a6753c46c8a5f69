//! Driving logical commands over a card channel.

use minicbor::{Decode, Encode};
use tracing::{debug, trace_span};

use crate::apdu::{self, Status};
use crate::ctap2::{GetInfoResponse, Instruction, MakeCredentialRequest, MakeCredentialResponse};
use crate::transport::Transport;
use crate::{Error, Result};

/// Replies open with one envelope byte ahead of the CBOR map; it is skipped
/// before decoding. On the wire it looks like the CTAP2 status octet, but
/// the applet doesn't document it, so it's treated as opaque.
// TODO: verify on hardware that this byte is the CTAP2 status code, and
// report it as a typed error when nonzero instead of skipping it.
const REPLY_PREFIX_LEN: usize = 1;

/// Upper bound on GET RESPONSE rounds for one reply. At up to 255 bytes a
/// round this is far beyond any message an authenticator will send; only a
/// misbehaving card gets anywhere near it.
const CHAIN_ROUND_LIMIT: usize = 64;

/// A FIDO token behind a card channel.
///
/// Owns the channel for the duration of a logical flow: the protocol is
/// half-duplex and stateful across chained rounds, so commands must not be
/// interleaved.
pub struct Token<T> {
    transport: T,
}

impl<T: Transport> Token<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Selects the FIDO applet. Returns the applet's answer, which for
    /// FIDO2 tokens is a version marker such as `FIDO_2_0`.
    pub fn select(&mut self) -> Result<Vec<u8>> {
        let span = trace_span!("select");
        let _enter = span.enter();

        self.exchange(&apdu::APPLET_SELECT)
    }

    /// Queries the authenticator's capabilities.
    pub fn get_info(&mut self) -> Result<GetInfoResponse> {
        let body = self.run_raw(Instruction::GetInfo, &[])?;
        decode_reply(&body)
    }

    /// Creates a credential on the authenticator.
    pub fn make_credential(
        &mut self,
        req: &MakeCredentialRequest,
    ) -> Result<MakeCredentialResponse> {
        self.run(Instruction::MakeCredential, req)
    }

    /// Encodes `req`, runs it as `ins`, and decodes the reassembled reply.
    /// An empty reply leaves the response at its default value.
    pub fn run<Req, Res>(&mut self, ins: Instruction, req: &Req) -> Result<Res>
    where
        Req: Encode<()>,
        Res: for<'b> Decode<'b, ()> + Default,
    {
        let mut payload = Vec::new();
        minicbor::encode(req, &mut payload)?;
        let body = self.run_raw(ins, &payload)?;
        decode_reply(&body)
    }

    /// Frames and runs one logical command, returning the reassembled reply
    /// body without decoding it.
    pub fn run_raw(&mut self, ins: Instruction, payload: &[u8]) -> Result<Vec<u8>> {
        let span = trace_span!("run", ?ins);
        let _enter = span.enter();

        let apdu = apdu::frame_command(ins.into(), payload)?;
        let body = self.exchange(&apdu)?;
        debug!(?ins, len = body.len(), "reply reassembled");
        Ok(body)
    }

    /// Sends one APDU and reassembles the chained reply: keep issuing GET
    /// RESPONSE while the card reports more data, then hand back the
    /// concatenated body.
    fn exchange(&mut self, req: &[u8]) -> Result<Vec<u8>> {
        let (mut body, mut status) = self.transceive(req)?;
        let mut rounds = 0;
        loop {
            match status {
                Status::Ok => return Ok(body),
                Status::MoreData(n) => {
                    rounds += 1;
                    if rounds > CHAIN_ROUND_LIMIT {
                        return Err(Error::ChainTooLong(rounds));
                    }
                    let (chunk, next) = self.transceive(&apdu::get_response(n))?;
                    body.extend_from_slice(&chunk);
                    status = next;
                }
                // Any partial body accumulated so far dies with the error.
                Status::Failed(sw1, sw2) => return Err(Error::Card(sw1, sw2)),
            }
        }
    }

    /// One transport round trip, split into body and classified status.
    fn transceive(&mut self, req: &[u8]) -> Result<(Vec<u8>, Status)> {
        let rsp = self.transport.transmit(req)?;
        let (body, status) = apdu::split_reply(&rsp)?;
        Ok((body.to_vec(), status))
    }
}

/// Decodes a reassembled reply, skipping the envelope byte. An empty reply
/// is not an error; it decodes to the default value.
fn decode_reply<Res>(body: &[u8]) -> Result<Res>
where
    Res: for<'b> Decode<'b, ()> + Default,
{
    if body.is_empty() {
        return Ok(Res::default());
    }
    Ok(minicbor::decode(&body[REPLY_PREFIX_LEN..])?)
}
