//! The external-registrar half of the exchange: turn M1 into M2 and check M3.

use harvestr_common::models::crypto::Transcript;
use harvestr_common::network::mac::Bssid;
use harvestr_protocols::wps::WpsError;
use harvestr_protocols::wps::keys::{self, DhKeyPair, NONCE_LEN, SessionKeys};
use harvestr_protocols::wps::message::{self, CONFIG_ERROR_NONE, M1, M2, M3};

#[derive(Debug, Clone)]
pub struct Registrar {
    keys: DhKeyPair,
    r_nonce: [u8; NONCE_LEN],
    uuid_r: [u8; 16],
}

impl Default for Registrar {
    fn default() -> Self {
        Self::new()
    }
}

impl Registrar {
    /// Fresh key pair and nonce, one per transaction.
    pub fn new() -> Self {
        Self::with_parts(DhKeyPair::generate(), keys::random_nonce(), keys::random_nonce())
    }

    pub fn with_parts(keys: DhKeyPair, r_nonce: [u8; NONCE_LEN], uuid_r: [u8; 16]) -> Self {
        Self { keys, r_nonce, uuid_r }
    }

    /// Parses M1, derives the session keys and encodes M2.
    pub fn respond(&self, m1_raw: &[u8]) -> Result<(Session, Vec<u8>), WpsError> {
        let m1 = M1::parse(m1_raw)?;
        let dh_key = self.keys.dh_key(&m1.public_key)?;
        let session_keys = keys::derive_session_keys(&dh_key, &m1.e_nonce, &m1.enrollee_mac, &self.r_nonce);

        let m2 = M2 {
            e_nonce: &m1.e_nonce,
            r_nonce: &self.r_nonce,
            uuid_r: &self.uuid_r,
            public_key: self.keys.public_key(),
            auth_types: m1.auth_types,
            encr_types: m1.encr_types,
            device_password_id: m1.device_password_id,
        }
        .encode(&session_keys.auth_key, m1_raw);

        let session = Session {
            m1,
            keys: session_keys,
            pkr: self.keys.public_key().to_vec(),
            r_nonce: self.r_nonce,
            m2: m2.clone(),
        };
        Ok((session, m2))
    }
}

/// State kept between sending M2 and receiving M3.
#[derive(Debug, Clone)]
pub struct Session {
    m1: M1,
    keys: SessionKeys,
    pkr: Vec<u8>,
    r_nonce: [u8; NONCE_LEN],
    m2: Vec<u8>,
}

impl Session {
    pub fn m1(&self) -> &M1 {
        &self.m1
    }

    /// Accepts M3 only if it echoes our nonce and authenticates over `M2 || M3`.
    pub fn accept_m3(&self, raw: &[u8]) -> Result<M3, WpsError> {
        let m3 = M3::parse(raw)?;
        if m3.r_nonce != self.r_nonce {
            return Err(WpsError::NonceMismatch);
        }
        message::verify_authenticator(raw, &self.keys.auth_key, &self.m2)?;
        Ok(m3)
    }

    /// Ends the session after M3.
    pub fn nack(&self) -> Vec<u8> {
        message::build_nack(&self.m1.e_nonce, &self.r_nonce, CONFIG_ERROR_NONE)
    }

    pub fn transcript(&self, m3: &M3) -> Transcript {
        let mac = self.m1.enrollee_mac;
        Transcript {
            enrollee_mac: Bssid::new(mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]),
            pke: self.m1.public_key.clone(),
            pkr: self.pkr.clone(),
            e_hash1: m3.e_hash1.to_vec(),
            e_hash2: m3.e_hash2.to_vec(),
            auth_key: self.keys.auth_key.to_vec(),
            e_nonce: self.m1.e_nonce.to_vec(),
            r_nonce: self.r_nonce.to_vec(),
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use harvestr_protocols::wps::enrollee::Enrollee;

    #[test]
    fn full_exchange_yields_matching_transcript() {
        let enrollee = Enrollee::new([0x02, 0, 0, 0, 0, 0x42], "12345670");
        let m1 = enrollee.m1();

        let (session, m2) = Registrar::new().respond(&m1).unwrap();
        let reply = enrollee.m3(&m1, &m2).unwrap();
        let m3 = session.accept_m3(&reply.bytes).unwrap();

        let t = session.transcript(&m3);
        assert_eq!(t.pke.as_slice(), enrollee.public_key().as_slice());
        assert_eq!(t.pkr, reply.pkr);
        assert_eq!(t.e_hash1, reply.e_hash1.to_vec());
        assert_eq!(t.e_hash2, reply.e_hash2.to_vec());
        assert_eq!(t.auth_key, reply.auth_key.to_vec());
        assert_eq!(t.e_nonce, enrollee.e_nonce().to_vec());
        assert_eq!(t.enrollee_mac, Bssid::new(0x02, 0, 0, 0, 0, 0x42));
    }

    #[test]
    fn m3_for_another_session_is_refused() {
        let enrollee = Enrollee::new([0x02, 0, 0, 0, 0, 0x42], "12345670");
        let m1 = enrollee.m1();

        let (_, m2_other) = Registrar::new().respond(&m1).unwrap();
        let (session, _) = Registrar::new().respond(&m1).unwrap();
        let stray = enrollee.m3(&m1, &m2_other).unwrap();

        assert_eq!(session.accept_m3(&stray.bytes), Err(WpsError::NonceMismatch));
    }

    #[test]
    fn forged_m3_fails_authentication() {
        let enrollee = Enrollee::new([0x02, 0, 0, 0, 0, 0x42], "12345670");
        let m1 = enrollee.m1();
        let (session, m2) = Registrar::new().respond(&m1).unwrap();

        let mut forged = enrollee.m3(&m1, &m2).unwrap().bytes;
        let last = forged.len() - 1;
        forged[last] ^= 0x01;
        assert_eq!(session.accept_m3(&forged), Err(WpsError::BadAuthenticator));
    }

    #[test]
    fn garbage_instead_of_m1() {
        assert!(Registrar::new().respond(&[0x10, 0x4A]).is_err());
    }
}
