//! I2P destination codec
//!
//! A destination is the KeysAndCert identity blob: a fixed-size public key
//! block, a variable-length certificate, and (for destinations we own) the
//! private key material that followed it in the keyfile. This module only
//! parses and serializes the layout; signature and key bytes stay opaque.
//!
//! Keyfile layout:
//! - Public encryption key (256 bytes)
//! - Public signing key (128 bytes)
//! - Certificate type (1 byte)
//! - Certificate body length (2 bytes, big-endian)
//! - Certificate body (variable)
//! - Secret key (256 bytes, private keyfiles only)
//! - Signing secret key (length keyed by signature type, private only)
//!
//! Anything after the expected structure is a format error.

use base64::alphabet::Alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::{Result, SamError};

/// Public encryption key length
pub const PUBLIC_KEY_LEN: usize = 256;

/// Public signing key length
pub const SIGNING_PUBLIC_KEY_LEN: usize = 128;

/// Fixed KeysAndCert prefix: both public keys plus certificate type and
/// certificate body length
pub const KEYS_CERT_HEADER_LEN: usize = PUBLIC_KEY_LEN + SIGNING_PUBLIC_KEY_LEN + 3;

/// Secret (encryption) key length in private keyfiles
pub const SECRET_KEY_LEN: usize = 256;

/// I2P's base64 alphabet: standard with `+` -> `-` and `/` -> `~`
const I2P_BASE64_ALPHABET: Alphabet = match Alphabet::new(
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-~",
) {
    Ok(alphabet) => alphabet,
    Err(_) => panic!("malformed base64 alphabet"),
};

/// Unpadded on encode, indifferent to padding on decode
const I2P_BASE64: GeneralPurpose = GeneralPurpose::new(
    &I2P_BASE64_ALPHABET,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Signature algorithm tags carried in `SIGNATURE_TYPE=`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigType {
    EcdsaSha256P256,
    EcdsaSha384P384,
    EcdsaSha512P521,
    #[default]
    EdDsaSha512Ed25519,
}

impl SigType {
    /// Numeric tag used on the wire
    pub fn code(self) -> u16 {
        match self {
            SigType::EcdsaSha256P256 => 1,
            SigType::EcdsaSha384P384 => 2,
            SigType::EcdsaSha512P521 => 3,
            SigType::EdDsaSha512Ed25519 => 7,
        }
    }

    pub fn from_code(code: u16) -> Result<Self> {
        match code {
            1 => Ok(SigType::EcdsaSha256P256),
            2 => Ok(SigType::EcdsaSha384P384),
            3 => Ok(SigType::EcdsaSha512P521),
            7 => Ok(SigType::EdDsaSha512Ed25519),
            other => Err(SamError::Validation(format!(
                "unknown signature type {other}"
            ))),
        }
    }

    /// Length of the signing secret key for this algorithm
    pub fn signing_secret_len(self) -> usize {
        match self {
            SigType::EcdsaSha256P256 => 32,
            SigType::EcdsaSha384P384 => 48,
            SigType::EcdsaSha512P521 => 66,
            SigType::EdDsaSha512Ed25519 => 32,
        }
    }
}

/// An I2P endpoint identity
///
/// Constructed once from a byte buffer or base64 text, immutable afterwards.
/// The two textual projections ([`base64`](Destination::base64) and
/// [`base32`](Destination::base32)) are derived from the certificate bytes on
/// demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    keys_cert: Vec<u8>,
    private: Option<PrivateKeys>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PrivateKeys {
    sig_type: SigType,
    secret_key: Vec<u8>,
    signing_secret_key: Vec<u8>,
}

impl Destination {
    /// Parse a public destination from raw certificate bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::parse(bytes, None)
    }

    /// Parse a public destination from its base64 text form.
    pub fn from_base64(text: &str) -> Result<Self> {
        Self::parse(&b64_decode(text)?, None)
    }

    /// Parse a private keyfile: certificate plus both secret keys.
    pub fn private_from_bytes(bytes: &[u8], sig_type: SigType) -> Result<Self> {
        Self::parse(bytes, Some(sig_type))
    }

    /// Parse a base64-encoded private keyfile, as returned by
    /// `SESSION CREATE` and `DEST GENERATE`.
    pub fn private_from_base64(text: &str, sig_type: SigType) -> Result<Self> {
        Self::parse(&b64_decode(text)?, Some(sig_type))
    }

    fn parse(bytes: &[u8], private: Option<SigType>) -> Result<Self> {
        let mut cursor = Cursor { buf: bytes, pos: 0 };

        let header = cursor.take(KEYS_CERT_HEADER_LEN, "KeysAndCert header")?;
        let body_len = u16::from_be_bytes([
            header[KEYS_CERT_HEADER_LEN - 2],
            header[KEYS_CERT_HEADER_LEN - 1],
        ]) as usize;
        let mut keys_cert = header.to_vec();
        keys_cert.extend_from_slice(cursor.take(body_len, "certificate body")?);

        let private = match private {
            Some(sig_type) => Some(PrivateKeys {
                sig_type,
                secret_key: cursor.take(SECRET_KEY_LEN, "secret key")?.to_vec(),
                signing_secret_key: cursor
                    .take(sig_type.signing_secret_len(), "signing secret key")?
                    .to_vec(),
            }),
            None => None,
        };

        if cursor.pos != bytes.len() {
            return Err(SamError::Validation(format!(
                "{} extra bytes at the end of keyfile",
                bytes.len() - cursor.pos
            )));
        }

        Ok(Destination { keys_cert, private })
    }

    /// Serialize back to the exact byte layout this destination was parsed
    /// from.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.keys_cert.clone();
        if let Some(private) = &self.private {
            bytes.extend_from_slice(&private.secret_key);
            bytes.extend_from_slice(&private.signing_secret_key);
        }
        bytes
    }

    /// Certificate bytes only, without any private key material.
    pub fn keys_cert(&self) -> &[u8] {
        &self.keys_cert
    }

    pub fn is_private(&self) -> bool {
        self.private.is_some()
    }

    /// Signature type, known only for private destinations.
    pub fn sig_type(&self) -> Option<SigType> {
        self.private.as_ref().map(|p| p.sig_type)
    }

    /// Base64 text form of the certificate, in I2P's alphabet.
    pub fn base64(&self) -> String {
        b64_encode(&self.keys_cert)
    }

    /// Base32 address: lowercase, unpadded base32 of the SHA-256 digest of
    /// the certificate bytes.
    pub fn base32(&self) -> String {
        let digest = Sha256::digest(&self.keys_cert);
        base32_nopad(&digest)
    }

    /// The connectable `<base32>.b32.i2p` name.
    pub fn b32_addr(&self) -> String {
        format!("{}.b32.i2p", self.base32())
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let remaining = self.buf.len() - self.pos;
        if remaining < len {
            return Err(SamError::Validation(format!(
                "{what} truncated: {remaining} < {len}"
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}

/// Encode bytes with I2P's base64 alphabet, no padding.
pub fn b64_encode(data: &[u8]) -> String {
    I2P_BASE64.encode(data)
}

/// Decode I2P-alphabet base64, padded or not.
pub fn b64_decode(text: &str) -> Result<Vec<u8>> {
    I2P_BASE64
        .decode(text)
        .map_err(|e| SamError::Validation(format!("bad base64: {e}")))
}

/// Lowercase unpadded RFC 4648 base32. The address form is derived here and
/// never decoded, so only the encoder exists.
fn base32_nopad(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    for chunk in data.chunks(5) {
        let mut block = [0u8; 5];
        block[..chunk.len()].copy_from_slice(chunk);
        let bits = (u64::from(block[0]) << 32)
            | (u64::from(block[1]) << 24)
            | (u64::from(block[2]) << 16)
            | (u64::from(block[3]) << 8)
            | u64::from(block[4]);
        let digits = (chunk.len() * 8).div_ceil(5);
        for i in 0..digits {
            let index = (bits >> (35 - 5 * i)) & 0x1f;
            out.push(BASE32_ALPHABET[index as usize] as char);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A syntactically valid public keyfile with a `cert_body_len`-byte
    /// certificate body.
    fn make_keys_cert(fill: u8, cert_body_len: u16) -> Vec<u8> {
        let mut bytes = vec![fill; KEYS_CERT_HEADER_LEN];
        bytes[KEYS_CERT_HEADER_LEN - 3] = 5; // cert type
        bytes[KEYS_CERT_HEADER_LEN - 2..].copy_from_slice(&cert_body_len.to_be_bytes());
        bytes.extend(std::iter::repeat(fill.wrapping_add(1)).take(cert_body_len as usize));
        bytes
    }

    fn make_private_keyfile(fill: u8, sig_type: SigType) -> Vec<u8> {
        let mut bytes = make_keys_cert(fill, 32);
        bytes.extend(std::iter::repeat(0xAA).take(SECRET_KEY_LEN));
        bytes.extend(std::iter::repeat(0xBB).take(sig_type.signing_secret_len()));
        bytes
    }

    #[test]
    fn test_sig_type_codes() {
        for sig_type in [
            SigType::EcdsaSha256P256,
            SigType::EcdsaSha384P384,
            SigType::EcdsaSha512P521,
            SigType::EdDsaSha512Ed25519,
        ] {
            assert_eq!(SigType::from_code(sig_type.code()).unwrap(), sig_type);
        }
        assert_eq!(SigType::default().code(), 7);
        assert_eq!(SigType::EcdsaSha512P521.signing_secret_len(), 66);
        assert!(SigType::from_code(4).is_err());
    }

    #[test]
    fn test_public_round_trip() {
        let bytes = make_keys_cert(0x11, 32);
        let dest = Destination::from_bytes(&bytes).unwrap();

        assert!(!dest.is_private());
        assert_eq!(dest.sig_type(), None);
        assert_eq!(dest.to_bytes(), bytes);
        assert_eq!(
            Destination::from_base64(&dest.base64()).unwrap(),
            dest
        );
    }

    #[test]
    fn test_private_round_trip_exact() {
        let bytes = make_private_keyfile(0x22, SigType::EdDsaSha512Ed25519);
        let dest =
            Destination::private_from_bytes(&bytes, SigType::EdDsaSha512Ed25519).unwrap();

        assert!(dest.is_private());
        assert_eq!(dest.sig_type(), Some(SigType::EdDsaSha512Ed25519));
        // no re-serialization drift
        assert_eq!(dest.to_bytes(), bytes);

        let from_b64 =
            Destination::private_from_base64(&b64_encode(&bytes), SigType::EdDsaSha512Ed25519)
                .unwrap();
        assert_eq!(from_b64, dest);
    }

    #[test]
    fn test_p521_signing_secret_length() {
        let bytes = make_private_keyfile(0x33, SigType::EcdsaSha512P521);
        let dest = Destination::private_from_bytes(&bytes, SigType::EcdsaSha512P521).unwrap();
        assert_eq!(dest.to_bytes(), bytes);

        // the same buffer parsed with a shorter signing key leaves a tail
        assert!(Destination::private_from_bytes(&bytes, SigType::EdDsaSha512Ed25519).is_err());
    }

    #[test]
    fn test_trailing_byte_rejected() {
        let mut bytes = make_private_keyfile(0x44, SigType::EdDsaSha512Ed25519);
        bytes.push(0);
        assert!(
            Destination::private_from_bytes(&bytes, SigType::EdDsaSha512Ed25519).is_err()
        );

        let mut public = make_keys_cert(0x44, 0);
        public.push(0);
        assert!(Destination::from_bytes(&public).is_err());
    }

    #[test]
    fn test_truncated_header_rejected() {
        let bytes = vec![0u8; KEYS_CERT_HEADER_LEN - 1];
        let err = Destination::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, SamError::Validation(_)));

        // header claims a body that is not there
        let bytes = make_keys_cert(0x55, 64);
        assert!(Destination::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_base32_depends_only_on_certificate() {
        let public = make_keys_cert(0x66, 32);
        let private = make_private_keyfile(0x66, SigType::EdDsaSha512Ed25519);

        let a = Destination::from_bytes(&public).unwrap();
        let b =
            Destination::private_from_bytes(&private, SigType::EdDsaSha512Ed25519).unwrap();
        assert_eq!(a.base32(), b.base32());
        assert_eq!(a.base64(), b.base64());

        let mut tweaked = public.clone();
        tweaked[0] ^= 1;
        let c = Destination::from_bytes(&tweaked).unwrap();
        assert_ne!(a.base32(), c.base32());
    }

    #[test]
    fn test_b32_addr_shape() {
        let dest = Destination::from_bytes(&make_keys_cert(0x77, 0)).unwrap();
        let addr = dest.b32_addr();
        // 32-byte digest -> 52 base32 digits
        assert_eq!(addr.len(), 52 + ".b32.i2p".len());
        assert!(addr.ends_with(".b32.i2p"));
        assert!(addr
            .chars()
            .take(52)
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_i2p_base64_alphabet_substitution() {
        // standard base64 of [0xfb, 0xff] is "+/8="; I2P swaps in '-' and '~'
        assert_eq!(b64_encode(&[0xfb, 0xff]), "-~8");
        assert_eq!(b64_decode("-~8").unwrap(), vec![0xfb, 0xff]);
        // padded input decodes the same
        assert_eq!(b64_decode("-~8=").unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn test_base32_known_answer() {
        // RFC 4648 test vector, lowercased and unpadded
        assert_eq!(base32_nopad(b"hello"), "nbswy3dp");
        assert_eq!(base32_nopad(b"fo"), "mzxq");
        assert_eq!(base32_nopad(b""), "");
    }
}
