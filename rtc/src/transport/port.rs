//! The interface candidate-gathering ports implement.
//!
//! STUN, TURN and plain UDP ports live outside this crate; a transport
//! channel built on top of them only needs what [`Port`] exposes.

use std::net::SocketAddr;

use base::SlotId;
use shared::error::Result;

use crate::transport::candidate::Candidate;

pub type CandidateReadyFn = Box<dyn Fn(&Candidate) + Send + Sync>;

pub trait Port: Send + Sync {
    fn content_name(&self) -> &str;

    fn component(&self) -> u16;

    /// Candidates gathered so far.
    fn candidates(&self) -> Vec<Candidate>;

    /// Starts gathering. Every candidate found is reported through
    /// `on_candidate_ready`.
    fn prepare_address(&self) -> Result<()>;

    fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<usize>;

    fn on_candidate_ready(&self, f: CandidateReadyFn) -> SlotId;
}
