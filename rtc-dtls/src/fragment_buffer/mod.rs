#[cfg(test)]
mod fragment_buffer_test;

use std::collections::HashMap;

use shared::error::{Error, Result};

use crate::handshake::{HANDSHAKE_HEADER_LENGTH, HandshakeHeader};
use crate::record_layer::{ContentType, RECORD_LAYER_HEADER_SIZE, RecordLayerHeader};

// 2 megabytes
const FRAGMENT_BUFFER_MAX_SIZE: usize = 2_000_000;

#[derive(Debug)]
struct Fragment {
    epoch: u16,
    handshake_header: HandshakeHeader,
    data: Vec<u8>,
}

/// Reassembles handshake messages that arrive split over several records,
/// and splits records that carry several messages. Messages come out in
/// message_seq order.
#[derive(Debug, Default)]
pub(crate) struct FragmentBuffer {
    // map of message_seq that hold slices of fragments
    cache: HashMap<u16, Vec<Fragment>>,
    current_message_sequence_number: u16,
}

impl FragmentBuffer {
    pub(crate) fn new() -> Self {
        FragmentBuffer::default()
    }

    fn size(&self) -> usize {
        self.cache
            .values()
            .flat_map(|frags| frags.iter())
            .map(|f| f.data.len())
            .sum()
    }

    /// Takes a plaintext record. Returns false when the record is not a
    /// handshake record and should be handled by the caller. An error means
    /// the record was malformed and must be dropped.
    pub(crate) fn push(&mut self, buf: &[u8]) -> Result<bool> {
        let current_size = self.size();
        if current_size + buf.len() >= FRAGMENT_BUFFER_MAX_SIZE {
            return Err(Error::ErrFragmentBufferOverflow {
                new_size: current_size + buf.len(),
                max_size: FRAGMENT_BUFFER_MAX_SIZE,
            });
        }

        let mut reader = buf;
        let record_layer_header = RecordLayerHeader::unmarshal(&mut reader)?;
        if record_layer_header.content_type != ContentType::Handshake {
            return Ok(false);
        }

        let mut body = &buf[RECORD_LAYER_HEADER_SIZE..];
        let mut fragments = vec![];
        while !body.is_empty() {
            let mut reader = body;
            let handshake_header = HandshakeHeader::unmarshal(&mut reader)?;

            let fragment_end =
                handshake_header.fragment_offset as usize + handshake_header.fragment_length as usize;
            if fragment_end > handshake_header.length as usize {
                return Err(Error::ErrLengthMismatch);
            }
            let end = HANDSHAKE_HEADER_LENGTH + handshake_header.fragment_length as usize;
            if end > body.len() {
                return Err(Error::ErrBufferTooShort);
            }

            fragments.push(Fragment {
                epoch: record_layer_header.epoch,
                handshake_header,
                data: body[HANDSHAKE_HEADER_LENGTH..end].to_vec(),
            });
            body = &body[end..];
        }

        for fragment in fragments {
            let seq = fragment.handshake_header.message_sequence;
            // already delivered, the record still counts as handshake traffic
            if seq < self.current_message_sequence_number {
                continue;
            }
            self.cache.entry(seq).or_default().push(fragment);
        }

        Ok(true)
    }

    /// Returns the next complete message in wire form with an unfragmented
    /// header, along with the epoch it arrived in.
    pub(crate) fn pop(&mut self) -> Option<(Vec<u8>, u16)> {
        let seq = self.current_message_sequence_number;
        let frags = self.cache.get_mut(&seq)?;
        frags.sort_by_key(|f| f.handshake_header.fragment_offset);

        let first = frags.first()?;
        let length = first.handshake_header.length as usize;
        let epoch = first.epoch;

        let mut message = Vec::with_capacity(length);
        for f in frags.iter() {
            let offset = f.handshake_header.fragment_offset as usize;
            if offset > message.len() {
                // hole before this fragment
                return None;
            }
            let end = offset + f.data.len();
            if end > message.len() {
                message.extend_from_slice(&f.data[message.len() - offset..]);
            }
        }
        if message.len() != length {
            return None;
        }

        let header = HandshakeHeader {
            fragment_offset: 0,
            fragment_length: length as u32,
            ..first.handshake_header
        };
        let mut raw = Vec::with_capacity(HANDSHAKE_HEADER_LENGTH + length);
        header.marshal(&mut raw).ok()?;
        raw.extend_from_slice(&message);

        self.cache.remove(&seq);
        self.current_message_sequence_number = seq.wrapping_add(1);
        Some((raw, epoch))
    }
}
