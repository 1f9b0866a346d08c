use std::collections::HashMap;

use shared::error::Result;

use super::{Handshake, HandshakeMessage, HandshakeType};

#[derive(Clone, Debug)]
pub(crate) struct HandshakeCacheItem {
    typ: HandshakeType,
    is_client: bool,
    epoch: u16,
    message_sequence: u16,
    data: Vec<u8>,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct HandshakeCachePullRule {
    pub(crate) typ: HandshakeType,
    pub(crate) epoch: u16,
    pub(crate) is_client: bool,
    pub(crate) optional: bool,
}

/// Every reassembled handshake message either side sent or received, in
/// wire form with an unfragmented header. Transcripts for signatures,
/// the session hash and Finished are rebuilt from it.
#[derive(Clone, Debug, Default)]
pub(crate) struct HandshakeCache {
    cache: Vec<HandshakeCacheItem>,
}

impl HandshakeCache {
    pub(crate) fn new() -> Self {
        HandshakeCache::default()
    }

    /// Stores a message unless this sender already delivered one with the
    /// same message_seq. Retransmitted flights are dropped that way.
    pub(crate) fn push(
        &mut self,
        data: Vec<u8>,
        epoch: u16,
        message_sequence: u16,
        typ: HandshakeType,
        is_client: bool,
    ) -> bool {
        if self
            .cache
            .iter()
            .any(|i| i.is_client == is_client && i.message_sequence == message_sequence)
        {
            return false;
        }

        self.cache.push(HandshakeCacheItem {
            typ,
            is_client,
            epoch,
            message_sequence,
            data,
        });
        true
    }

    /// The latest message (highest message_seq) matching the rule. A client
    /// answering a HelloVerifyRequest sends a second ClientHello, the
    /// transcript only covers that one.
    fn pull(&self, rule: &HandshakeCachePullRule) -> Option<&HandshakeCacheItem> {
        self.cache
            .iter()
            .filter(|i| i.typ == rule.typ && i.epoch == rule.epoch && i.is_client == rule.is_client)
            .max_by_key(|i| i.message_sequence)
    }

    /// Decodes the messages for `rules` and checks that they carry
    /// consecutive message_seq values starting at `start_seq`. Optional
    /// rules may be absent. Returns the next expected message_seq with the
    /// messages, or `None` while a mandatory message is missing or the
    /// sequence has a gap.
    pub(crate) fn full_pull_map(
        &self,
        start_seq: u16,
        rules: &[HandshakeCachePullRule],
    ) -> Result<Option<(u16, HashMap<HandshakeType, HandshakeMessage>)>> {
        let mut items = vec![];
        for rule in rules {
            match self.pull(rule) {
                Some(item) => items.push(item),
                None if rule.optional => {}
                None => return Ok(None),
            }
        }

        let mut out = HashMap::new();
        let mut seq = start_seq;
        for item in items {
            if item.message_sequence != seq {
                return Ok(None);
            }
            let mut reader = item.data.as_slice();
            let handshake = Handshake::unmarshal(&mut reader)?;
            seq = seq.wrapping_add(1);
            out.insert(item.typ, handshake.handshake_message);
        }
        Ok(Some((seq, out)))
    }

    /// Concatenates the raw messages matching `rules` in rule order.
    /// Missing messages are skipped.
    pub(crate) fn pull_and_merge(&self, rules: &[HandshakeCachePullRule]) -> Vec<u8> {
        let mut merged = vec![];
        for rule in rules {
            if let Some(item) = self.pull(rule) {
                merged.extend_from_slice(&item.data);
            }
        }
        merged
    }
}
