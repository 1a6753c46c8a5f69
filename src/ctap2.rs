//! The CTAP2 command set: instruction selectors, the CBOR shapes we
//! exchange with the authenticator, and the authenticator-data record
//! embedded in successful responses.
//!
//! Wire shapes are CTAP2 canonical CBOR: top-level maps keyed by small
//! positive integers, entities keyed by short text strings in canonical
//! (length-then-bytewise) order. See the CTAP 2.1 spec, §6 "Message
//! Encoding":
//! https://fidoalliance.org/specs/fido-v2.1-ps-20210615/fido-client-to-authenticator-protocol-v2.1-ps-20210615.html

use std::collections::BTreeMap;

use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};
use minicbor::{Decode, Encode};
use num_enum::IntoPrimitive;

use crate::Error;

/// Logical authenticator commands and their one-byte selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum Instruction {
    MakeCredential = 0x01,
    GetAssertion = 0x02,
    GetInfo = 0x04,
    ClientPin = 0x06,
    Reset = 0x07,
    GetNextAssertion = 0x08,
}

/// Relying-party identity, a `{"id", "name"}` text-keyed map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelyingParty {
    /// Usually a domain name; credentials are scoped to it.
    pub id: String,
    pub name: String,
}

impl<C> minicbor::Encode<C> for RelyingParty {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.map(2)?
            .str("id")?
            .str(&self.id)?
            .str("name")?
            .str(&self.name)?
            .ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for RelyingParty {
    fn decode(
        d: &mut minicbor::Decoder<'b>,
        _ctx: &mut C,
    ) -> Result<Self, minicbor::decode::Error> {
        let mut slf = Self::default();
        let len = d
            .map()?
            .ok_or_else(|| minicbor::decode::Error::message("expected sized map"))?;
        for _ in 0..len {
            match d.str()? {
                "id" => slf.id = d.str()?.into(),
                "name" => slf.name = d.str()?.into(),
                _ => d.skip()?,
            }
        }
        Ok(slf)
    }
}

/// User identity. The id is an opaque handle the authenticator hands back
/// in assertions; the name is for humans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub id: Vec<u8>,
    pub name: String,
}

impl<C> minicbor::Encode<C> for User {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.map(2)?
            .str("id")?
            .bytes(&self.id)?
            .str("name")?
            .str(&self.name)?
            .ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for User {
    fn decode(
        d: &mut minicbor::Decoder<'b>,
        _ctx: &mut C,
    ) -> Result<Self, minicbor::decode::Error> {
        let mut slf = Self::default();
        let len = d
            .map()?
            .ok_or_else(|| minicbor::decode::Error::message("expected sized map"))?;
        for _ in 0..len {
            match d.str()? {
                "id" => slf.id = d.bytes()?.to_vec(),
                "name" => slf.name = d.str()?.into(),
                _ => d.skip()?,
            }
        }
        Ok(slf)
    }
}

/// A supported credential type/algorithm pair, `{"alg", "type"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialParameters {
    /// COSE algorithm identifier.
    pub alg: i32,
    pub cred_type: String,
}

impl CredentialParameters {
    /// ECDSA w/ SHA-256 (COSE -7).
    pub fn es256() -> Self {
        Self {
            alg: -7,
            cred_type: "public-key".into(),
        }
    }

    /// RSASSA-PKCS1-v1_5 w/ SHA-256 (COSE -257).
    pub fn rs256() -> Self {
        Self {
            alg: -257,
            cred_type: "public-key".into(),
        }
    }
}

impl<C> minicbor::Encode<C> for CredentialParameters {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.map(2)?
            .str("alg")?
            .i32(self.alg)?
            .str("type")?
            .str(&self.cred_type)?
            .ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for CredentialParameters {
    fn decode(
        d: &mut minicbor::Decoder<'b>,
        _ctx: &mut C,
    ) -> Result<Self, minicbor::decode::Error> {
        let mut slf = Self::default();
        let len = d
            .map()?
            .ok_or_else(|| minicbor::decode::Error::message("expected sized map"))?;
        for _ in 0..len {
            match d.str()? {
                "alg" => slf.alg = d.i32()?,
                "type" => slf.cred_type = d.str()?.into(),
                _ => d.skip()?,
            }
        }
        Ok(slf)
    }
}

/// Credential creation options, `{"rk", "uv"}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Ask for a discoverable (resident) credential.
    pub rk: bool,
    /// Ask the authenticator to verify the user itself.
    pub uv: bool,
}

impl<C> minicbor::Encode<C> for Options {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.map(2)?
            .str("rk")?
            .bool(self.rk)?
            .str("uv")?
            .bool(self.uv)?
            .ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Options {
    fn decode(
        d: &mut minicbor::Decoder<'b>,
        _ctx: &mut C,
    ) -> Result<Self, minicbor::decode::Error> {
        let mut slf = Self::default();
        let len = d
            .map()?
            .ok_or_else(|| minicbor::decode::Error::message("expected sized map"))?;
        for _ in 0..len {
            match d.str()? {
                "rk" => slf.rk = d.bool()?,
                "uv" => slf.uv = d.bool()?,
                _ => d.skip()?,
            }
        }
        Ok(slf)
    }
}

/// authenticatorMakeCredential request (selector 0x01).
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
#[cbor(map)]
pub struct MakeCredentialRequest {
    /// SHA-256 of the client data, computed by the caller.
    #[cbor(n(0x01), with = "minicbor::bytes")]
    pub client_data_hash: Vec<u8>,
    #[n(0x02)]
    pub rp: RelyingParty,
    #[n(0x03)]
    pub user: User,
    /// In order of preference, most preferred first.
    #[n(0x04)]
    pub pub_key_cred_params: Vec<CredentialParameters>,
    #[n(0x07)]
    pub options: Options,
}

/// authenticatorMakeCredential response.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
#[cbor(map)]
pub struct MakeCredentialResponse {
    /// Attestation statement format identifier, eg. `packed`.
    #[n(0x01)]
    pub fmt: String,

    /// Raw authenticator data; see [`AuthenticatorData::parse`].
    #[cbor(n(0x02), with = "minicbor::bytes")]
    pub auth_data: Vec<u8>,

    #[n(0x03)]
    pub att_stmt: AttestationStatement,
}

/// A packed attestation statement, `{"alg", "sig", "x5c"}`.
///
/// Verifying it is out of scope here; we just carry the fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttestationStatement {
    pub alg: i32,
    pub sig: Vec<u8>,
    /// Certificate chain, leaf first; empty for self-attestation.
    pub x5c: Vec<Vec<u8>>,
}

impl<C> minicbor::Encode<C> for AttestationStatement {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.map(if self.x5c.is_empty() { 2 } else { 3 })?;
        e.str("alg")?.i32(self.alg)?;
        e.str("sig")?.bytes(&self.sig)?;
        if !self.x5c.is_empty() {
            e.str("x5c")?.array(self.x5c.len() as u64)?;
            for cert in &self.x5c {
                e.bytes(cert)?;
            }
        }
        Ok(())
    }
}

impl<'b, C> minicbor::Decode<'b, C> for AttestationStatement {
    fn decode(
        d: &mut minicbor::Decoder<'b>,
        _ctx: &mut C,
    ) -> Result<Self, minicbor::decode::Error> {
        let mut slf = Self::default();
        let len = d
            .map()?
            .ok_or_else(|| minicbor::decode::Error::message("expected sized map"))?;
        for _ in 0..len {
            match d.str()? {
                "alg" => slf.alg = d.i32()?,
                "sig" => slf.sig = d.bytes()?.to_vec(),
                "x5c" => {
                    let n = d
                        .array()?
                        .ok_or_else(|| minicbor::decode::Error::message("expected sized array"))?;
                    for _ in 0..n {
                        slf.x5c.push(d.bytes()?.to_vec());
                    }
                }
                _ => d.skip()?,
            }
        }
        Ok(slf)
    }
}

/// authenticatorGetInfo response (selector 0x04, no request payload).
///
/// Only the commonly-populated keys are typed; authenticators ship plenty
/// more, which the decoder skips.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
#[cbor(map)]
pub struct GetInfoResponse {
    /// Supported protocol versions, eg. `FIDO_2_0`, `U2F_V2`.
    #[n(0x01)]
    pub versions: Vec<String>,
    #[n(0x02)]
    pub extensions: Option<Vec<String>>,
    /// Authenticator model identifier, 16 bytes.
    #[cbor(n(0x03), with = "minicbor::bytes")]
    pub aaguid: Vec<u8>,
    #[n(0x04)]
    pub options: Option<BTreeMap<String, bool>>,
    #[n(0x05)]
    pub max_msg_size: Option<u64>,
    #[n(0x06)]
    pub pin_protocols: Option<Vec<u64>>,
}

bitflags! {
    /// Flag bits of the authenticator-data record.
    pub struct Flags: u8 {
        /// User was present (touched the token).
        const UP = 0b0000_0001;
        /// User was verified (PIN, biometrics).
        const UV = 0b0000_0100;
        /// Attested credential data follows the header.
        const AT = 0b0100_0000;
        /// Extension data follows.
        const ED = 0b1000_0000;
    }
}

/// Length of the fixed authenticator-data header.
pub const AUTHENTICATOR_DATA_LEN: usize = 37;

/// The fixed-layout header of an authenticator-data record: 32 bytes of
/// relying-party hash, one flags byte, and a big-endian 32-bit signature
/// counter. Attested credential data and extensions may follow; this type
/// doesn't parse them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    /// SHA-256 of the relying-party id the credential is scoped to.
    pub rp_id_hash: [u8; 32],
    pub flags: Flags,
    pub sign_count: u32,
}

impl AuthenticatorData {
    /// Carves the fixed header out of `buf`, copying it out so the result
    /// outlives the reply buffer.
    pub fn parse(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < AUTHENTICATOR_DATA_LEN {
            return Err(Error::AuthDataTooShort(buf.len()));
        }
        let mut rp_id_hash = [0; 32];
        rp_id_hash.copy_from_slice(&buf[..32]);
        Ok(Self {
            rp_id_hash,
            flags: Flags::from_bits_truncate(buf[32]),
            sign_count: BigEndian::read_u32(&buf[33..37]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_codes() {
        assert_eq!(u8::from(Instruction::MakeCredential), 0x01);
        assert_eq!(u8::from(Instruction::GetAssertion), 0x02);
        assert_eq!(u8::from(Instruction::GetInfo), 0x04);
        assert_eq!(u8::from(Instruction::ClientPin), 0x06);
        assert_eq!(u8::from(Instruction::Reset), 0x07);
        assert_eq!(u8::from(Instruction::GetNextAssertion), 0x08);
    }

    #[test]
    fn test_make_credential_request_layout() {
        let req = MakeCredentialRequest {
            client_data_hash: vec![0; 32],
            rp: RelyingParty {
                id: "echo.co.uk".into(),
                name: "echo.co.uk".into(),
            },
            user: User {
                id: b"some-user-handle".to_vec(),
                name: "alex.barlow@echo.co.uk".into(),
            },
            pub_key_cred_params: vec![
                CredentialParameters::rs256(),
                CredentialParameters::es256(),
            ],
            options: Options::default(),
        };

        let mut buf = Vec::new();
        minicbor::encode(&req, &mut buf).unwrap();

        // Map of 5 keys; key 1 is a 32-byte string; key 2 opens the rp map
        // with "id" first (canonical order).
        assert_eq!(buf[0], 0xA5);
        assert_eq!(buf[1], 0x01);
        assert_eq!(&buf[2..4], &[0x58, 0x20]);
        assert_eq!(buf[36], 0x02);
        assert_eq!(&buf[37..41], &[0xA2, 0x62, b'i', b'd']);

        let back: MakeCredentialRequest = minicbor::decode(&buf).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn test_make_credential_response_decode() {
        // Hand-built reply map: fmt, auth_data, att_stmt with an unknown
        // trailing key that has to be skipped.
        let mut buf = Vec::new();
        {
            let mut e = minicbor::Encoder::new(&mut buf);
            e.map(3).unwrap();
            e.u8(0x01).unwrap().str("packed").unwrap();
            e.u8(0x02).unwrap().bytes(&[0xAB; 37]).unwrap();
            e.u8(0x03).unwrap();
            e.map(3).unwrap();
            e.str("alg").unwrap().i32(-7).unwrap();
            e.str("sig").unwrap().bytes(&[0xC0, 0xFF, 0xEE]).unwrap();
            e.str("ver").unwrap().str("1.0").unwrap();
        }

        let rsp: MakeCredentialResponse = minicbor::decode(&buf).unwrap();
        assert_eq!(rsp.fmt, "packed");
        assert_eq!(rsp.auth_data, vec![0xAB; 37]);
        assert_eq!(
            rsp.att_stmt,
            AttestationStatement {
                alg: -7,
                sig: vec![0xC0, 0xFF, 0xEE],
                x5c: vec![],
            },
        );
    }

    #[test]
    fn test_attestation_statement_roundtrip_with_certs() {
        let stmt = AttestationStatement {
            alg: -257,
            sig: vec![1, 2, 3],
            x5c: vec![vec![4, 5], vec![6]],
        };
        let mut buf = Vec::new();
        minicbor::encode(&stmt, &mut buf).unwrap();
        assert_eq!(buf[0], 0xA3);
        let back: AttestationStatement = minicbor::decode(&buf).unwrap();
        assert_eq!(back, stmt);
    }

    #[test]
    fn test_get_info_decode() {
        // authenticatorGetInfo reply from a real token (YubiKey); carries
        // keys 0x07-0x0A beyond the typed set, which must be skipped.
        let raw: Vec<u8> = vec![
            170, 1, 131, 102, 85, 50, 70, 95, 86, 50, 104, 70, 73, 68, 79, 95, 50, 95, 48, 108,
            70, 73, 68, 79, 95, 50, 95, 49, 95, 80, 82, 69, 2, 130, 107, 99, 114, 101, 100, 80,
            114, 111, 116, 101, 99, 116, 107, 104, 109, 97, 99, 45, 115, 101, 99, 114, 101, 116,
            3, 80, 47, 192, 87, 159, 129, 19, 71, 234, 177, 22, 187, 90, 141, 185, 32, 42, 4,
            165, 98, 114, 107, 245, 98, 117, 112, 245, 100, 112, 108, 97, 116, 244, 105, 99, 108,
            105, 101, 110, 116, 80, 105, 110, 245, 117, 99, 114, 101, 100, 101, 110, 116, 105,
            97, 108, 77, 103, 109, 116, 80, 114, 101, 118, 105, 101, 119, 245, 5, 25, 4, 176, 6,
            129, 1, 7, 8, 8, 24, 128, 9, 130, 99, 110, 102, 99, 99, 117, 115, 98, 10, 130, 162,
            99, 97, 108, 103, 38, 100, 116, 121, 112, 101, 106, 112, 117, 98, 108, 105, 99, 45,
            107, 101, 121, 162, 99, 97, 108, 103, 39, 100, 116, 121, 112, 101, 106, 112, 117, 98,
            108, 105, 99, 45, 107, 101, 121,
        ];

        let info: GetInfoResponse = minicbor::decode(&raw).unwrap();
        assert_eq!(
            info.versions,
            vec!["U2F_V2".to_string(), "FIDO_2_0".into(), "FIDO_2_1_PRE".into()],
        );
        assert_eq!(
            info.extensions,
            Some(vec!["credProtect".to_string(), "hmac-secret".into()]),
        );
        assert_eq!(
            info.aaguid,
            vec![47, 192, 87, 159, 129, 19, 71, 234, 177, 22, 187, 90, 141, 185, 32, 42],
        );
        let options = info.options.unwrap();
        assert_eq!(options.get("rk"), Some(&true));
        assert_eq!(options.get("plat"), Some(&false));
        assert_eq!(info.max_msg_size, Some(1200));
        assert_eq!(info.pin_protocols, Some(vec![1]));
    }

    #[test]
    fn test_authenticator_data_parse() {
        let mut buf = vec![0xAA; 32];
        buf.push(0x41);
        buf.extend_from_slice(&[0x00, 0x00, 0x00, 0x05]);

        let ad = AuthenticatorData::parse(&buf).unwrap();
        assert_eq!(ad.rp_id_hash, [0xAA; 32]);
        assert_eq!(ad.flags, Flags::UP | Flags::AT);
        assert_eq!(ad.sign_count, 5);
    }

    #[test]
    fn test_authenticator_data_too_short() {
        assert!(matches!(
            AuthenticatorData::parse(&[0xAA; 36]),
            Err(Error::AuthDataTooShort(36)),
        ));
    }
}
