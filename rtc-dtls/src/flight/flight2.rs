use std::fmt;

use shared::error::Error;

use super::flight0::{Flight0, negotiate};
use super::flight4::Flight4;
use super::*;
use crate::handshake::HandshakeMessageHelloVerifyRequest;
use crate::record_layer::PROTOCOL_VERSION1_0;

#[derive(Debug, PartialEq)]
pub(crate) struct Flight2;

impl fmt::Display for Flight2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flight 2")
    }
}

impl Flight for Flight2 {
    fn has_retransmit(&self) -> bool {
        false
    }

    fn parse(
        &self,
        state: &mut State,
        cache: &HandshakeCache,
        cfg: &HandshakeConfig,
    ) -> Result<Box<dyn Flight + Send + Sync>, FlightError> {
        let Some((seq, msgs)) = pull_flight(
            cache,
            state.handshake_recv_sequence,
            &[rule(HandshakeType::ClientHello, 0, true)],
        )?
        else {
            // the first ClientHello again, our HelloVerifyRequest was lost
            return Flight0 {}.parse(state, cache, cfg);
        };

        let Some(HandshakeMessage::ClientHello(client_hello)) =
            msgs.get(&HandshakeType::ClientHello)
        else {
            return Err(internal_error(Error::ErrHandshakeMessageUnexpected));
        };

        if client_hello.cookie.is_empty() {
            return Err((None, None));
        }
        if client_hello.cookie != state.cookie {
            return Err(fatal(AlertDescription::AccessDenied, Error::ErrCookieMismatch));
        }

        negotiate(state, cfg, client_hello)?;
        state.handshake_recv_sequence = seq;
        Ok(Box::new(Flight4 {}))
    }

    fn generate(
        &self,
        state: &mut State,
        cache: &mut HandshakeCache,
        _cfg: &HandshakeConfig,
    ) -> Result<Vec<Packet>, FlightError> {
        // HelloVerifyRequest and the first ClientHello both use message_seq 0
        state.handshake_send_sequence = 0;

        // DTLS 1.0 regardless of the version to be negotiated, RFC 6347 Section 4.2.1
        let hello_verify_request =
            HandshakeMessage::HelloVerifyRequest(HandshakeMessageHelloVerifyRequest {
                version: PROTOCOL_VERSION1_0,
                cookie: state.cookie.clone(),
            });
        Ok(vec![handshake_packet(
            state,
            cache,
            0,
            hello_verify_request,
        )?])
    }
}
