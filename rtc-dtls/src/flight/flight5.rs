use std::fmt;

use log::debug;
use shared::error::Error;

use super::*;
use crate::handshake::{
    HandshakeMessageCertificate, HandshakeMessageCertificateVerify,
    HandshakeMessageClientKeyExchange, HandshakeMessageFinished,
};
use crate::handshaker::srv_cli_str;
use crate::prf::{prf_verify_data_client, prf_verify_data_server, session_hash};

#[derive(Debug, PartialEq)]
pub(crate) struct Flight5;

impl fmt::Display for Flight5 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flight 5")
    }
}

impl Flight for Flight5 {
    fn is_last_recv_flight(&self) -> bool {
        true
    }

    fn parse(
        &self,
        state: &mut State,
        cache: &HandshakeCache,
        _cfg: &HandshakeConfig,
    ) -> Result<Box<dyn Flight + Send + Sync>, FlightError> {
        let Some((seq, msgs)) = pull_flight(
            cache,
            state.handshake_recv_sequence,
            &[rule(HandshakeType::Finished, 1, false)],
        )?
        else {
            return Err((None, None));
        };

        let Some(HandshakeMessage::Finished(finished)) = msgs.get(&HandshakeType::Finished) else {
            return Err(internal_error(Error::ErrHandshakeMessageUnexpected));
        };

        let expected = prf_verify_data_server(
            &state.master_secret,
            &cache.pull_and_merge(&server_finished_rules()),
        )
        .map_err(internal_error)?;
        if expected != finished.verify_data {
            return Err(fatal(
                AlertDescription::DecryptError,
                Error::ErrVerifyDataMismatch,
            ));
        }

        state.handshake_recv_sequence = seq;
        Ok(Box::new(Flight5 {}))
    }

    fn generate(
        &self,
        state: &mut State,
        cache: &mut HandshakeCache,
        cfg: &HandshakeConfig,
    ) -> Result<Vec<Packet>, FlightError> {
        let mut pkts = vec![];

        if state.remote_requested_certificate {
            let certificate = HandshakeMessage::Certificate(HandshakeMessageCertificate {
                certificate: vec![cfg.local_certificate.certificate.clone()],
            });
            pkts.push(handshake_packet(state, cache, 0, certificate)?);
        }

        let client_key_exchange =
            HandshakeMessage::ClientKeyExchange(HandshakeMessageClientKeyExchange {
                public_key: state.local_public_key.clone(),
            });
        pkts.push(handshake_packet(state, cache, 0, client_key_exchange)?);

        if !state.is_cipher_suite_initialized() {
            let hash = session_hash(&cache.pull_and_merge(&transcript_rules()));
            state.init_cipher_suite(&hash).map_err(internal_error)?;
            debug!(
                "[handshake:{}] record keys derived",
                srv_cli_str(state.is_client)
            );
        }

        if state.remote_requested_certificate {
            let signature = cfg
                .local_certificate
                .sign(&cache.pull_and_merge(&transcript_rules()))
                .map_err(internal_error)?;
            let certificate_verify =
                HandshakeMessage::CertificateVerify(HandshakeMessageCertificateVerify {
                    algorithm: SignatureHashAlgorithm::ECDSA_SHA256,
                    signature,
                });
            pkts.push(handshake_packet(state, cache, 0, certificate_verify)?);
        }

        pkts.push(Packet::change_cipher_spec());

        let verify_data = prf_verify_data_client(
            &state.master_secret,
            &cache.pull_and_merge(&client_finished_rules()),
        )
        .map_err(internal_error)?;
        let finished = HandshakeMessage::Finished(HandshakeMessageFinished { verify_data });
        pkts.push(handshake_packet(state, cache, 1, finished)?);

        Ok(pkts)
    }
}
