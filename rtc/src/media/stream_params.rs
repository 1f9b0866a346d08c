use rand::Rng;
use serde::{Deserialize, Serialize};

/// A group of SSRCs with a shared semantic, e.g. "FID" or "SIM".
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsrcGroup {
    pub semantics: String,
    pub ssrcs: Vec<u32>,
}

/// One media source: the SSRCs it sends with and how signaling names it.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamParams {
    pub groupid: String,
    pub nick: String,
    pub name: String,
    pub ssrcs: Vec<u32>,
    pub ssrc_groups: Vec<SsrcGroup>,
    pub cname: String,
}

impl StreamParams {
    pub fn new(nick: &str, name: &str, ssrcs: Vec<u32>) -> Self {
        StreamParams {
            nick: nick.to_owned(),
            name: name.to_owned(),
            ssrcs,
            ..Default::default()
        }
    }

    /// A stream identified by a single SSRC.
    pub fn with_ssrc(ssrc: u32) -> Self {
        StreamParams {
            ssrcs: vec![ssrc],
            ..Default::default()
        }
    }

    /// The SSRC that identifies the stream, 0 when it has none.
    pub fn first_ssrc(&self) -> u32 {
        self.ssrcs.first().copied().unwrap_or(0)
    }

    pub fn has_ssrcs(&self) -> bool {
        !self.ssrcs.is_empty()
    }

    pub fn has_ssrc(&self, ssrc: u32) -> bool {
        self.ssrcs.contains(&ssrc)
    }
}

pub fn get_stream_by_ssrc(streams: &[StreamParams], ssrc: u32) -> Option<&StreamParams> {
    streams.iter().find(|sp| sp.has_ssrc(ssrc))
}

pub fn get_stream_by_nick_and_name<'a>(
    streams: &'a [StreamParams],
    nick: &str,
    name: &str,
) -> Option<&'a StreamParams> {
    streams.iter().find(|sp| sp.nick == nick && sp.name == name)
}

/// Removes every stream carrying `ssrc`. Returns true if any was removed.
pub fn remove_stream_by_ssrc(streams: &mut Vec<StreamParams>, ssrc: u32) -> bool {
    let before = streams.len();
    streams.retain(|sp| !sp.has_ssrc(ssrc));
    streams.len() != before
}

/// A random non-zero SSRC not used by any of `streams`.
pub fn generate_ssrc(streams: &[StreamParams]) -> u32 {
    let mut rng = rand::rng();
    loop {
        let ssrc: u32 = rng.random();
        if ssrc != 0 && get_stream_by_ssrc(streams, ssrc).is_none() {
            return ssrc;
        }
    }
}
