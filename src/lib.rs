//! Talking CTAP2 to a FIDO token over PC/SC.
//!
//! The interesting part is the transport: commands are CBOR maps wrapped in
//! a vendor APDU envelope, and replies come back in status-word-chained
//! chunks that have to be reassembled before they can be decoded. [`Token`]
//! drives the whole exchange; [`transport::Pcsc`] supplies the raw channel.

pub mod apdu;
pub mod ctap2;
pub mod errors;
pub mod token;
pub mod transport;

pub use errors::{Error, Result};
pub use token::Token;
pub use transport::Transport;
