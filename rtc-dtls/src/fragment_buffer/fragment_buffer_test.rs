use super::*;
use crate::handshake::HandshakeType;
use crate::record_layer::PROTOCOL_VERSION1_2;

fn record(content_type: ContentType, epoch: u16, body: &[u8]) -> Result<Vec<u8>> {
    let header = RecordLayerHeader {
        content_type,
        protocol_version: PROTOCOL_VERSION1_2,
        epoch,
        sequence_number: 0,
        content_len: body.len() as u16,
    };
    let mut raw = vec![];
    header.marshal(&mut raw)?;
    raw.extend_from_slice(body);
    Ok(raw)
}

fn fragment(
    typ: HandshakeType,
    seq: u16,
    message: &[u8],
    offset: usize,
    len: usize,
) -> Result<Vec<u8>> {
    let header = HandshakeHeader {
        handshake_type: typ,
        length: message.len() as u32,
        message_sequence: seq,
        fragment_offset: offset as u32,
        fragment_length: len as u32,
    };
    let mut raw = vec![];
    header.marshal(&mut raw)?;
    raw.extend_from_slice(&message[offset..offset + len]);
    Ok(raw)
}

fn whole(typ: HandshakeType, seq: u16, message: &[u8]) -> Result<Vec<u8>> {
    fragment(typ, seq, message, 0, message.len())
}

#[test]
fn test_fragment_buffer_ignores_other_content() -> Result<()> {
    let mut buffer = FragmentBuffer::new();
    assert!(!buffer.push(&record(ContentType::ChangeCipherSpec, 0, &[0x01])?)?);
    assert!(buffer.pop().is_none());
    Ok(())
}

#[test]
fn test_fragment_buffer_reassembles_out_of_order() -> Result<()> {
    let message: Vec<u8> = (0..100).collect();
    let mut buffer = FragmentBuffer::new();

    let tail = fragment(HandshakeType::Certificate, 0, &message, 60, 40)?;
    let head = fragment(HandshakeType::Certificate, 0, &message, 0, 30)?;
    let middle = fragment(HandshakeType::Certificate, 0, &message, 25, 35)?;

    assert!(buffer.push(&record(ContentType::Handshake, 0, &tail)?)?);
    assert!(buffer.pop().is_none());
    assert!(buffer.push(&record(ContentType::Handshake, 0, &head)?)?);
    assert!(buffer.pop().is_none());
    // overlaps the head by five bytes
    assert!(buffer.push(&record(ContentType::Handshake, 0, &middle)?)?);

    let (raw, epoch) = buffer.pop().expect("message complete");
    assert_eq!(epoch, 0);
    assert_eq!(raw, whole(HandshakeType::Certificate, 0, &message)?);
    assert!(buffer.pop().is_none());
    Ok(())
}

#[test]
fn test_fragment_buffer_multiple_messages_per_record() -> Result<()> {
    let mut body = whole(HandshakeType::ServerHello, 1, &[1, 2, 3])?;
    body.extend_from_slice(&whole(HandshakeType::ServerHelloDone, 2, &[])?);

    let mut buffer = FragmentBuffer::new();
    buffer.current_message_sequence_number = 1;
    assert!(buffer.push(&record(ContentType::Handshake, 0, &body)?)?);

    let (first, _) = buffer.pop().expect("server hello");
    assert_eq!(first, whole(HandshakeType::ServerHello, 1, &[1, 2, 3])?);
    let (second, _) = buffer.pop().expect("server hello done");
    assert_eq!(second, whole(HandshakeType::ServerHelloDone, 2, &[])?);
    assert!(buffer.pop().is_none());
    Ok(())
}

#[test]
fn test_fragment_buffer_in_sequence_order() -> Result<()> {
    let mut buffer = FragmentBuffer::new();
    buffer.push(&record(
        ContentType::Handshake,
        1,
        &whole(HandshakeType::Finished, 1, &[9u8; 12])?,
    )?)?;
    // message 0 is still missing
    assert!(buffer.pop().is_none());

    buffer.push(&record(
        ContentType::Handshake,
        0,
        &whole(HandshakeType::ClientKeyExchange, 0, &[1, 7])?,
    )?)?;
    assert_eq!(buffer.pop().map(|(_, epoch)| epoch), Some(0));
    assert_eq!(buffer.pop().map(|(_, epoch)| epoch), Some(1));

    // a retransmission of a delivered message is still handshake traffic
    assert!(buffer.push(&record(
        ContentType::Handshake,
        0,
        &whole(HandshakeType::ClientKeyExchange, 0, &[1, 7])?,
    )?)?);
    assert!(buffer.pop().is_none());
    assert!(buffer.cache.is_empty());
    Ok(())
}

#[test]
fn test_fragment_buffer_rejects_bad_fragments() -> Result<()> {
    let mut buffer = FragmentBuffer::new();

    // fragment runs past the message length
    let mut bad = HandshakeHeader {
        handshake_type: HandshakeType::Certificate,
        length: 10,
        message_sequence: 0,
        fragment_offset: 8,
        fragment_length: 4,
    };
    let mut raw = vec![];
    bad.marshal(&mut raw)?;
    raw.extend_from_slice(&[0u8; 4]);
    assert_eq!(
        buffer.push(&record(ContentType::Handshake, 0, &raw)?),
        Err(Error::ErrLengthMismatch)
    );

    // fragment claims more bytes than the record carries
    bad.fragment_offset = 0;
    let mut raw = vec![];
    bad.marshal(&mut raw)?;
    raw.extend_from_slice(&[0u8; 2]);
    assert_eq!(
        buffer.push(&record(ContentType::Handshake, 0, &raw)?),
        Err(Error::ErrBufferTooShort)
    );
    assert!(buffer.cache.is_empty());
    Ok(())
}

#[test]
fn test_fragment_buffer_overflow() -> Result<()> {
    let mut buffer = FragmentBuffer::new();
    let message = vec![0u8; 60_000];

    // fragments of a message that never completes
    let mut offset = 0;
    let mut result = Ok(true);
    while result.is_ok() {
        let len = 1000.min(message.len() - offset);
        let frag = fragment(HandshakeType::Certificate, 0, &message, offset, len)?;
        result = buffer.push(&record(ContentType::Handshake, 0, &frag)?);
        offset = (offset + 1000) % 59_000;
    }

    assert!(matches!(
        result,
        Err(Error::ErrFragmentBufferOverflow {
            max_size: FRAGMENT_BUFFER_MAX_SIZE,
            ..
        })
    ));
    assert!(buffer.size() < FRAGMENT_BUFFER_MAX_SIZE);
    Ok(())
}
