//! The raw card channel.

use crate::Result;
use tracing::{trace, trace_span};

/// One synchronous request/response exchange with the card.
///
/// Everything above this trait works in whole APDUs and never retries;
/// timeouts and reconnect policy, if wanted, belong in the implementation.
pub trait Transport {
    fn transmit(&mut self, req: &[u8]) -> Result<Vec<u8>>;
}

/// PC/SC-backed channel.
///
/// Connecting (and, for multi-command flows, holding the card exclusively)
/// is the caller's business; see the `talisman` binary for the usual dance.
pub struct Pcsc {
    card: pcsc::Card,
}

impl Pcsc {
    pub fn new(card: pcsc::Card) -> Self {
        Self { card }
    }
}

impl Transport for Pcsc {
    fn transmit(&mut self, req: &[u8]) -> Result<Vec<u8>> {
        let span = trace_span!("transmit");
        let _enter = span.enter();

        trace!(req = %hex::encode(req), ">> TX");
        let mut rbuf = [0; pcsc::MAX_BUFFER_SIZE];
        let rsp = self.card.transmit(req, &mut rbuf)?;
        trace!(rsp = %hex::encode(rsp), "<< RX");
        Ok(rsp.to_vec())
    }
}
