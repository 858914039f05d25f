//! Diffie-Hellman and the registration-protocol key schedule.
//!
//! WPS uses the 1536-bit MODP group (RFC 3526 group 5, generator 2). Public keys
//! travel as 192-byte big-endian integers, left-padded with zeros.

use std::sync::OnceLock;

use hmac::{Hmac, Mac};
use num_bigint::BigUint;
use rand::Rng;
use sha2::{Digest, Sha256};

use super::WpsError;

type HmacSha256 = Hmac<Sha256>;

pub const PUBLIC_KEY_LEN: usize = 192;
pub const NONCE_LEN: usize = 16;
pub const AUTHENTICATOR_LEN: usize = 8;

const KDF_LABEL: &[u8] = b"Wi-Fi Easy and Secure Key Derivation";
const KDF_BITS: u32 = 640;

const GROUP5_PRIME_HEX: &[u8] = b"\
FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D\
C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F\
83655D23DCA3AD961C62F356208552BB9ED529077096966D\
670C354E4ABC9804F1746C08CA237327FFFFFFFFFFFFFFFF";

fn prime() -> &'static BigUint {
    static PRIME: OnceLock<BigUint> = OnceLock::new();
    PRIME.get_or_init(|| {
        BigUint::parse_bytes(GROUP5_PRIME_HEX, 16).expect("group 5 prime is valid hex")
    })
}

fn to_fixed(value: &BigUint) -> [u8; PUBLIC_KEY_LEN] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; PUBLIC_KEY_LEN];
    out[PUBLIC_KEY_LEN - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// One side of a group 5 exchange.
#[derive(Clone)]
pub struct DhKeyPair {
    secret: BigUint,
    public: [u8; PUBLIC_KEY_LEN],
}

impl std::fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhKeyPair").finish_non_exhaustive()
    }
}

impl DhKeyPair {
    pub fn generate() -> Self {
        let mut secret = [0u8; PUBLIC_KEY_LEN];
        rand::rng().fill(&mut secret[..]);
        Self::from_secret(&secret)
    }

    /// Builds a pair from fixed secret bytes, reduced into the group.
    pub fn from_secret(secret: &[u8]) -> Self {
        let p = prime();
        let secret = BigUint::from_bytes_be(secret) % p;
        let public = BigUint::from(2u8).modpow(&secret, p);
        Self {
            secret,
            public: to_fixed(&public),
        }
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public
    }

    /// Computes `DHKey = SHA-256(peer^secret mod p)`.
    pub fn dh_key(&self, peer: &[u8]) -> Result<[u8; 32], WpsError> {
        if peer.len() != PUBLIC_KEY_LEN {
            return Err(WpsError::BadLength {
                name: "public key",
                expected: PUBLIC_KEY_LEN,
                got: peer.len(),
            });
        }
        let p = prime();
        let peer = BigUint::from_bytes_be(peer);
        let one = BigUint::from(1u8);
        if peer <= one || peer >= p - &one {
            return Err(WpsError::BadPublicKey);
        }
        let shared = peer.modpow(&self.secret, p);
        let mut key = [0u8; 32];
        key.copy_from_slice(&Sha256::digest(to_fixed(&shared)));
        Ok(key)
    }
}

/// Keys derived from the exchange. Only the authentication key is used to talk to
/// the enrollee; the others are kept for completeness of the derivation.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKeys {
    pub auth_key: [u8; 32],
    pub key_wrap_key: [u8; 16],
    pub emsk: [u8; 32],
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

pub fn derive_session_keys(
    dh_key: &[u8; 32],
    e_nonce: &[u8; NONCE_LEN],
    enrollee_mac: &[u8; 6],
    r_nonce: &[u8; NONCE_LEN],
) -> SessionKeys {
    let kdk = hmac_sha256(dh_key, &[e_nonce.as_slice(), enrollee_mac.as_slice(), r_nonce.as_slice()]);
    let out = kdf(&kdk, KDF_LABEL, KDF_BITS);

    let mut keys = SessionKeys {
        auth_key: [0; 32],
        key_wrap_key: [0; 16],
        emsk: [0; 32],
    };
    keys.auth_key.copy_from_slice(&out[..32]);
    keys.key_wrap_key.copy_from_slice(&out[32..48]);
    keys.emsk.copy_from_slice(&out[48..80]);
    keys
}

/// The counter-mode HMAC-SHA-256 key derivation function from Wi-Fi Simple Configuration.
pub fn kdf(key: &[u8], label: &[u8], bits: u32) -> Vec<u8> {
    let len = bits.div_ceil(8) as usize;
    let rounds = len.div_ceil(32) as u32;
    let mut out = Vec::with_capacity(rounds as usize * 32);
    for i in 1..=rounds {
        out.extend_from_slice(&hmac_sha256(
            key,
            &[&i.to_be_bytes()[..], label, &bits.to_be_bytes()[..]],
        ));
    }
    out.truncate(len);
    out
}

/// First 8 bytes of `HMAC-SHA-256(AuthKey, previous || current)`, where `current`
/// excludes its own authenticator attribute.
pub fn authenticator(auth_key: &[u8; 32], previous: &[u8], current: &[u8]) -> [u8; AUTHENTICATOR_LEN] {
    let digest = hmac_sha256(auth_key, &[previous, current]);
    let mut out = [0u8; AUTHENTICATOR_LEN];
    out.copy_from_slice(&digest[..AUTHENTICATOR_LEN]);
    out
}

/// One PIN-half commitment as sent in M3: `HMAC(AuthKey, S || PSK || PKE || PKR)`,
/// where `PSK` is the first 16 bytes of `HMAC(AuthKey, pin_half)`.
pub fn pin_commitment(
    auth_key: &[u8; 32],
    secret: &[u8; NONCE_LEN],
    pin_half: &[u8],
    pke: &[u8],
    pkr: &[u8],
) -> [u8; 32] {
    let psk = hmac_sha256(auth_key, &[pin_half]);
    hmac_sha256(auth_key, &[secret.as_slice(), &psk[..16], pke, pkr])
}

pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill(&mut nonce[..]);
    nonce
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut mac =
        HmacSha256::new_from_slice(key).expect("HMAC-SHA-256 accepts keys of any size");
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
