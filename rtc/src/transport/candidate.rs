use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use shared::util::math_rand_alpha;

/// Component id of the RTP transport of a content.
pub const ICE_CANDIDATE_COMPONENT_RTP: u16 = 1;
/// Component id of the RTCP transport of a content.
pub const ICE_CANDIDATE_COMPONENT_RTCP: u16 = 2;

pub(crate) const ICE_UFRAG_LENGTH: usize = 16;
pub(crate) const ICE_PWD_LENGTH: usize = 22;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateType {
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified,
    #[serde(rename = "host")]
    Host,
    #[serde(rename = "srflx")]
    ServerReflexive,
    #[serde(rename = "prflx")]
    PeerReflexive,
    #[serde(rename = "relay")]
    Relay,
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CandidateType::Host => "host",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::Relay => "relay",
            CandidateType::Unspecified => "Unknown candidate type",
        };
        write!(f, "{s}")
    }
}

impl CandidateType {
    /// RFC 5245 section 4.1.2.2 type preference.
    pub const fn preference(self) -> u32 {
        match self {
            Self::Host => 126,
            Self::PeerReflexive => 110,
            Self::ServerReflexive => 100,
            Self::Relay | Self::Unspecified => 0,
        }
    }
}

/// A transport address a port can be reached at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub component: u16,
    pub protocol: String,
    pub address: SocketAddr,
    pub priority: u32,
    pub username: String,
    pub password: String,
    pub candidate_type: CandidateType,
    pub generation: u32,
    pub foundation: String,
}

impl Candidate {
    /// A candidate with freshly generated ICE credentials and the RFC 5245
    /// priority for its type and component.
    pub fn new(
        component: u16,
        protocol: &str,
        address: SocketAddr,
        candidate_type: CandidateType,
        local_preference: u16,
    ) -> Self {
        Candidate {
            component,
            protocol: protocol.to_owned(),
            address,
            priority: compute_priority(candidate_type, local_preference, component),
            username: math_rand_alpha(ICE_UFRAG_LENGTH),
            password: math_rand_alpha(ICE_PWD_LENGTH),
            candidate_type,
            generation: 0,
            foundation: compute_foundation(candidate_type, protocol, address),
        }
    }

    /// Two candidates are equivalent when they describe the same transport
    /// address for the same component, whatever their priority.
    pub fn is_equivalent(&self, other: &Candidate) -> bool {
        self.component == other.component
            && self.protocol == other.protocol
            && self.address == other.address
            && self.username == other.username
            && self.password == other.password
            && self.candidate_type == other.candidate_type
            && self.generation == other.generation
            && self.foundation == other.foundation
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cand[{}:{}:{}:{}:{}:{}:{}]",
            self.foundation,
            self.component,
            self.protocol,
            self.priority,
            self.address,
            self.candidate_type,
            self.generation
        )
    }
}

/// priority = (2^24)*(type preference) + (2^8)*(local preference) + (256 - component ID)
pub fn compute_priority(candidate_type: CandidateType, local_preference: u16, component: u16) -> u32 {
    (1 << 24) * candidate_type.preference()
        + (1 << 8) * u32::from(local_preference)
        + (256 - u32::from(component.min(256)))
}

/// Candidates of the same type, protocol and base address share a foundation.
fn compute_foundation(candidate_type: CandidateType, protocol: &str, address: SocketAddr) -> String {
    let mut h: u32 = 0x811c_9dc5;
    for b in candidate_type
        .to_string()
        .bytes()
        .chain(protocol.bytes())
        .chain(address.ip().to_string().bytes())
    {
        h ^= u32::from(b);
        h = h.wrapping_mul(0x0100_0193);
    }
    h.to_string()
}
