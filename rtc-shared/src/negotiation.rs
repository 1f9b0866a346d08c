use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of description being applied to a channel or filter.
///
/// `Offer`, `PrAnswer` and `Answer` carry the full desired state; `Update`
/// only carries what changed since the last full description.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentAction {
    Offer,
    PrAnswer,
    Answer,
    Update,
}

impl fmt::Display for ContentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ContentAction::Offer => "offer",
            ContentAction::PrAnswer => "pranswer",
            ContentAction::Answer => "answer",
            ContentAction::Update => "update",
        };
        write!(f, "{s}")
    }
}

/// Which side produced a description.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentSource {
    Local,
    Remote,
}

impl ContentSource {
    pub fn other(self) -> Self {
        match self {
            ContentSource::Local => ContentSource::Remote,
            ContentSource::Remote => ContentSource::Local,
        }
    }
}

impl fmt::Display for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ContentSource::Local => "local",
            ContentSource::Remote => "remote",
        };
        write!(f, "{s}")
    }
}
