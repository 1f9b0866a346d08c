
use rand::{Rng, rng};

/// Smallest packet accepted as RTP: the fixed 12-byte header.
pub const MIN_RTP_PACKET_LEN: usize = 12;
/// Upper bound on RTP and RTCP packets handled by a channel.
pub const MAX_RTP_PACKET_LEN: usize = 2048;
/// Smallest packet accepted as RTCP: the common 4-byte header.
pub const MIN_RTCP_PACKET_LEN: usize = 4;
/// DTLS record header: type, version, epoch, 48-bit sequence, length.
pub const DTLS_RECORD_HEADER_LEN: usize = 13;

pub const RTCP_TYPE_SR: u8 = 200;
pub const RTCP_TYPE_RR: u8 = 201;
pub const RTCP_TYPE_SDES: u8 = 202;
pub const RTCP_TYPE_BYE: u8 = 203;
pub const RTCP_TYPE_APP: u8 = 204;

const RTP_PAYLOAD_TYPE_OFFSET: usize = 1;
const RTP_SEQ_NUM_OFFSET: usize = 2;
const RTP_TIMESTAMP_OFFSET: usize = 4;
const RTP_SSRC_OFFSET: usize = 8;
const RTCP_PAYLOAD_TYPE_OFFSET: usize = 1;
const RTCP_SSRC_OFFSET: usize = 4;

// match_range is a MatchFunc that accepts packets with the first byte in [lower..upper]
fn match_range(lower: u8, upper: u8) -> impl Fn(&[u8]) -> bool {
    move |buf: &[u8]| -> bool {
        if buf.is_empty() {
            return false;
        }
        let b = buf[0];
        b >= lower && b <= upper
    }
}

/// MatchFuncs as described in RFC7983
/// <https://tools.ietf.org/html/rfc7983>
///              +----------------+
///              |        [0..3] -+--> forward to STUN
///              |                |
///              |      [16..19] -+--> forward to ZRTP
///              |                |
///  packet -->  |      [20..63] -+--> forward to DTLS
///              |                |
///              |      [64..79] -+--> forward to TURN Channel
///              |                |
///              |    [128..191] -+--> forward to RTP/RTCP
///              +----------------+
/// match_dtls is a MatchFunc that accepts packets with the first byte in [20..63]
/// as defied in RFC7983
pub fn match_dtls(b: &[u8]) -> bool {
    match_range(20, 63)(b)
}

// match_srtp_or_srtcp is a MatchFunc that accepts packets with the first byte in [128..191]
// as defied in RFC7983
pub fn match_srtp_or_srtcp(b: &[u8]) -> bool {
    match_range(128, 191)(b)
}

pub fn is_rtcp(buf: &[u8]) -> bool {
    // Not long enough to determine RTP/RTCP
    if buf.len() < 4 {
        return false;
    }

    let rtcp_packet_type = buf[1];
    (192..=223).contains(&rtcp_packet_type)
}

/// match_srtp is a MatchFunc that only matches SRTP and not SRTCP
pub fn match_srtp(buf: &[u8]) -> bool {
    match_srtp_or_srtcp(buf) && !is_rtcp(buf)
}

/// match_srtcp is a MatchFunc that only matches SRTCP and not SRTP
pub fn match_srtcp(buf: &[u8]) -> bool {
    match_srtp_or_srtcp(buf) && is_rtcp(buf)
}

/// RTP version 2 sets the two high bits of the first byte to `10`.
pub fn is_rtp_lead_byte(b: u8) -> bool {
    (b & 0xC0) == 0x80
}

/// A datagram that can carry a DTLS record: content type in [20..63] and
/// room for the record header.
pub fn is_dtls_packet(buf: &[u8]) -> bool {
    buf.len() >= DTLS_RECORD_HEADER_LEN && match_dtls(buf)
}

/// An RTP or RTCP shaped datagram (RTP version 2 lead byte).
pub fn is_rtp_packet(buf: &[u8]) -> bool {
    !buf.is_empty() && is_rtp_lead_byte(buf[0])
}

/// Size gate applied to every packet before any RTP/RTCP processing.
pub fn valid_packet(rtcp: bool, len: usize) -> bool {
    let min = if rtcp {
        MIN_RTCP_PACKET_LEN
    } else {
        MIN_RTP_PACKET_LEN
    };
    len >= min && len <= MAX_RTP_PACKET_LEN
}

pub fn packet_type(rtcp: bool) -> &'static str {
    if rtcp { "RTCP" } else { "RTP" }
}

fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let b = buf.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([b[0], b[1]]))
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let b = buf.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

pub fn get_rtp_payload_type(buf: &[u8]) -> Option<u8> {
    if buf.len() < MIN_RTP_PACKET_LEN {
        return None;
    }
    Some(buf[RTP_PAYLOAD_TYPE_OFFSET] & 0x7F)
}

pub fn get_rtp_seq_num(buf: &[u8]) -> Option<u16> {
    if buf.len() < MIN_RTP_PACKET_LEN {
        return None;
    }
    read_u16(buf, RTP_SEQ_NUM_OFFSET)
}

pub fn get_rtp_timestamp(buf: &[u8]) -> Option<u32> {
    if buf.len() < MIN_RTP_PACKET_LEN {
        return None;
    }
    read_u32(buf, RTP_TIMESTAMP_OFFSET)
}

pub fn get_rtp_ssrc(buf: &[u8]) -> Option<u32> {
    if buf.len() < MIN_RTP_PACKET_LEN {
        return None;
    }
    read_u32(buf, RTP_SSRC_OFFSET)
}

/// Length of the RTP header including CSRCs and the header extension.
pub fn get_rtp_header_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < MIN_RTP_PACKET_LEN {
        return None;
    }
    let csrc_count = (buf[0] & 0x0F) as usize;
    let mut len = MIN_RTP_PACKET_LEN + 4 * csrc_count;
    if buf[0] & 0x10 != 0 {
        let ext_words = read_u16(buf, len + 2)? as usize;
        len += 4 + 4 * ext_words;
    }
    if len > buf.len() {
        return None;
    }
    Some(len)
}

pub fn get_rtcp_type(buf: &[u8]) -> Option<u8> {
    if buf.len() < MIN_RTCP_PACKET_LEN {
        return None;
    }
    Some(buf[RTCP_PAYLOAD_TYPE_OFFSET])
}

pub fn get_rtcp_ssrc(buf: &[u8]) -> Option<u32> {
    read_u32(buf, RTCP_SSRC_OFFSET)
}

const RUNES_ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RUNES_ALPHA_NUMBER: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// math_rand_alpha generates a mathematical random alphabet sequence of the requested length.
pub fn math_rand_alpha(n: usize) -> String {
    generate_crypto_random_string(n, RUNES_ALPHA)
}

/// math_rand_alpha generates a mathematical random alphabet and number sequence of the requested length.
pub fn math_rand_alpha_number(n: usize) -> String {
    generate_crypto_random_string(n, RUNES_ALPHA_NUMBER)
}

pub fn generate_crypto_random_string(n: usize, runes: &[u8]) -> String {
    let mut rng = rng();

    let rand_string: String = (0..n)
        .map(|_| {
            let idx = rng.random_range(0..runes.len());
            runes[idx] as char
        })
        .collect();

    rand_string
}
