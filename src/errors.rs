use std::convert::Infallible;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The reader or card went away mid-exchange.
    #[error("pcsc: {0}")]
    Pcsc(#[from] pcsc::Error),

    /// A reply has to carry at least a 2-byte status word.
    #[error("reply too short: {0} bytes")]
    ReplyTooShort(usize),

    /// Encoded command data doesn't fit a single frame; the length field is
    /// one byte and we don't do outbound chaining.
    #[error("command payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// The card answered with an error status word.
    #[error("card error: sw1={0:02X} sw2={1:02X}")]
    Card(u8, u8),

    /// The card kept signalling more data past the round cap.
    #[error("gave up reassembling a chained reply after {0} rounds")]
    ChainTooLong(usize),

    #[error("cbor encode: {0}")]
    Encode(#[from] minicbor::encode::Error<Infallible>),

    #[error("cbor decode: {0}")]
    Decode(#[from] minicbor::decode::Error),

    /// Authenticator data opens with a fixed 37-byte header.
    #[error("authenticator data too short: {0} bytes")]
    AuthDataTooShort(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
