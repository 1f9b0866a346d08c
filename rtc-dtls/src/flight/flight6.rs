use std::fmt;

use super::*;
use crate::handshake::HandshakeMessageFinished;
use crate::prf::prf_verify_data_server;

#[derive(Debug, PartialEq)]
pub(crate) struct Flight6;

impl fmt::Display for Flight6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flight 6")
    }
}

impl Flight for Flight6 {
    fn is_last_send_flight(&self) -> bool {
        true
    }

    fn has_retransmit(&self) -> bool {
        false
    }

    fn parse(
        &self,
        _state: &mut State,
        _cache: &HandshakeCache,
        _cfg: &HandshakeConfig,
    ) -> Result<Box<dyn Flight + Send + Sync>, FlightError> {
        // Nothing follows; a repeated Flight 5 only triggers a resend.
        Err((None, None))
    }

    fn generate(
        &self,
        state: &mut State,
        cache: &mut HandshakeCache,
        _cfg: &HandshakeConfig,
    ) -> Result<Vec<Packet>, FlightError> {
        let verify_data = prf_verify_data_server(
            &state.master_secret,
            &cache.pull_and_merge(&server_finished_rules()),
        )
        .map_err(internal_error)?;

        let finished = HandshakeMessage::Finished(HandshakeMessageFinished { verify_data });
        Ok(vec![
            Packet::change_cipher_spec(),
            handshake_packet(state, cache, 1, finished)?,
        ])
    }
}
