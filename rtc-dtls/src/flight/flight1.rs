use std::fmt;

use super::flight3::{Flight3, check_hello_verify_request};
use super::*;

#[derive(Debug, PartialEq)]
pub(crate) struct Flight1;

impl fmt::Display for Flight1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flight 1")
    }
}

impl Flight for Flight1 {
    fn parse(
        &self,
        state: &mut State,
        cache: &HandshakeCache,
        cfg: &HandshakeConfig,
    ) -> Result<Box<dyn Flight + Send + Sync>, FlightError> {
        // HelloVerifyRequest can be skipped by the server, so allow
        // ServerHello during flight1 also
        let Some((seq, msgs)) = pull_flight(
            cache,
            state.handshake_recv_sequence,
            &[
                optional(HandshakeType::HelloVerifyRequest, 0, false),
                optional(HandshakeType::ServerHello, 0, false),
            ],
        )?
        else {
            return Err((None, None));
        };

        if msgs.contains_key(&HandshakeType::ServerHello) {
            // Flight 2 was skipped
            return Flight3 {}.parse(state, cache, cfg);
        }

        match msgs.get(&HandshakeType::HelloVerifyRequest) {
            Some(HandshakeMessage::HelloVerifyRequest(hello_verify_request)) => {
                check_hello_verify_request(hello_verify_request)?;
                state.cookie.clone_from(&hello_verify_request.cookie);
                state.handshake_recv_sequence = seq;
                Ok(Box::new(Flight3 {}))
            }
            _ => Err((None, None)),
        }
    }

    fn generate(
        &self,
        state: &mut State,
        cache: &mut HandshakeCache,
        cfg: &HandshakeConfig,
    ) -> Result<Vec<Packet>, FlightError> {
        let hello = client_hello(state, cfg);
        Ok(vec![handshake_packet(state, cache, 0, hello)?])
    }
}
