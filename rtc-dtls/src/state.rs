use rand::RngCore;

use shared::error::Result;

use crate::cipher_suite::CryptoGcm;
use crate::curve::{NamedCurve, NamedCurveKeypair};
use crate::extension::extension_use_srtp::SrtpProtectionProfile;
use crate::handshake::RANDOM_BYTES_LENGTH;
use crate::prf::{prf_encryption_keys, prf_extended_master_secret, prf_master_secret};

pub(crate) const COOKIE_LENGTH: usize = 20;

/// Connection state negotiated during the handshake.
pub struct State {
    pub(crate) is_client: bool,
    pub(crate) local_epoch: u16,
    pub(crate) remote_epoch: u16,
    pub(crate) local_sequence_number: Vec<u64>, // uint48, one per epoch
    pub(crate) local_random: [u8; RANDOM_BYTES_LENGTH],
    pub(crate) remote_random: [u8; RANDOM_BYTES_LENGTH],
    pub(crate) session_id: Vec<u8>,
    pub(crate) cookie: Vec<u8>,

    pub(crate) named_curve: NamedCurve,
    pub(crate) local_keypair: Option<NamedCurveKeypair>,
    // kept after the private key is consumed, ClientKeyExchange is resent as is
    pub(crate) local_public_key: Vec<u8>,
    pub(crate) pre_master_secret: Vec<u8>,
    pub(crate) master_secret: Vec<u8>,
    pub(crate) cipher_suite: Option<CryptoGcm>,

    pub(crate) extended_master_secret: bool,
    pub(crate) secure_renegotiation: bool,
    pub(crate) srtp_protection_profile: SrtpProtectionProfile,
    pub(crate) peer_certificate: Option<Vec<u8>>,
    pub(crate) remote_requested_certificate: bool,

    pub(crate) handshake_send_sequence: u16,
    pub(crate) handshake_recv_sequence: u16,
}

impl State {
    pub(crate) fn new(is_client: bool) -> Self {
        let mut local_random = [0u8; RANDOM_BYTES_LENGTH];
        rand::rng().fill_bytes(&mut local_random);

        State {
            is_client,
            local_epoch: 0,
            remote_epoch: 0,
            local_sequence_number: vec![],
            local_random,
            remote_random: [0u8; RANDOM_BYTES_LENGTH],
            session_id: vec![],
            cookie: vec![],

            named_curve: NamedCurve::Unsupported,
            local_keypair: None,
            local_public_key: vec![],
            pre_master_secret: vec![],
            master_secret: vec![],
            cipher_suite: None,

            extended_master_secret: false,
            secure_renegotiation: false,
            srtp_protection_profile: SrtpProtectionProfile::Unsupported,
            peer_certificate: None,
            remote_requested_certificate: false,

            handshake_send_sequence: 0,
            handshake_recv_sequence: 0,
        }
    }

    pub(crate) fn client_random(&self) -> &[u8] {
        if self.is_client {
            &self.local_random
        } else {
            &self.remote_random
        }
    }

    pub(crate) fn server_random(&self) -> &[u8] {
        if self.is_client {
            &self.remote_random
        } else {
            &self.local_random
        }
    }

    pub(crate) fn generate_cookie(&mut self) {
        self.cookie = vec![0u8; COOKIE_LENGTH];
        rand::rng().fill_bytes(&mut self.cookie);
    }

    /// Derives the master secret and record keys from the pre-master
    /// secret. `session_hash` is only used when the extended master secret
    /// was negotiated.
    pub(crate) fn init_cipher_suite(&mut self, session_hash: &[u8]) -> Result<()> {
        self.master_secret = if self.extended_master_secret {
            prf_extended_master_secret(&self.pre_master_secret, session_hash)?
        } else {
            prf_master_secret(
                &self.pre_master_secret,
                self.client_random(),
                self.server_random(),
            )?
        };
        let keys =
            prf_encryption_keys(&self.master_secret, self.client_random(), self.server_random())?;
        self.cipher_suite = Some(CryptoGcm::new(&keys, self.is_client)?);
        self.pre_master_secret.clear();
        Ok(())
    }

    pub(crate) fn is_cipher_suite_initialized(&self) -> bool {
        self.cipher_suite.is_some()
    }

    /// Returns the next record sequence number for `epoch`.
    pub(crate) fn next_sequence_number(&mut self, epoch: u16) -> u64 {
        while self.local_sequence_number.len() <= epoch as usize {
            self.local_sequence_number.push(0);
        }
        let seq = self.local_sequence_number[epoch as usize];
        self.local_sequence_number[epoch as usize] += 1;
        seq
    }

    pub(crate) fn next_handshake_sequence(&mut self) -> u16 {
        let seq = self.handshake_send_sequence;
        self.handshake_send_sequence += 1;
        seq
    }
}
