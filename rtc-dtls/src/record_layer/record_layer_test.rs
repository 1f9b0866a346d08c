use super::*;

#[test]
fn test_record_layer_header_round_trip() -> Result<()> {
    let header = RecordLayerHeader {
        content_type: ContentType::Handshake,
        protocol_version: PROTOCOL_VERSION1_2,
        epoch: 1,
        sequence_number: 0x0000_0102_0304_0506,
        content_len: 0x0708,
    };

    let mut raw = vec![];
    header.marshal(&mut raw)?;
    assert_eq!(
        raw,
        vec![
            0x16, 0xfe, 0xfd, 0x00, 0x01, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08
        ]
    );

    let mut reader = raw.as_slice();
    assert_eq!(RecordLayerHeader::unmarshal(&mut reader)?, header);
    Ok(())
}

#[test]
fn test_record_layer_header_rejects_bad_input() {
    let mut reader: &[u8] = &[0x16, 0x03, 0x03, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    assert_eq!(
        RecordLayerHeader::unmarshal(&mut reader),
        Err(Error::ErrUnsupportedProtocolVersion)
    );

    // a DTLS 1.0 record version is accepted
    let mut reader: &[u8] = &[0x16, 0xfe, 0xff, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    assert_eq!(
        RecordLayerHeader::unmarshal(&mut reader).map(|h| h.protocol_version),
        Ok(PROTOCOL_VERSION1_0)
    );

    let mut reader: &[u8] = &[0x63, 0xfe, 0xfd, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    assert_eq!(
        RecordLayerHeader::unmarshal(&mut reader),
        Err(Error::ErrInvalidContentType)
    );

    let header = RecordLayerHeader {
        sequence_number: MAX_SEQUENCE_NUMBER + 1,
        content_type: ContentType::Alert,
        ..Default::default()
    };
    assert_eq!(
        header.marshal(&mut vec![]),
        Err(Error::ErrSequenceNumberOverflow)
    );
}

#[test]
fn test_unpack_datagram() -> Result<()> {
    let record_a = [
        0x14, 0xfe, 0xfd, 0x00, 0x00, 0, 0, 0, 0, 0, 0x01, 0x00, 0x01, 0x01,
    ];
    let record_b = [
        0x17, 0xfe, 0xfd, 0x00, 0x01, 0, 0, 0, 0, 0, 0x02, 0x00, 0x02, 0xAA, 0xBB,
    ];
    let mut datagram = record_a.to_vec();
    datagram.extend_from_slice(&record_b);

    let records = unpack_datagram(&datagram)?;
    assert_eq!(records, vec![&record_a[..], &record_b[..]]);

    assert_eq!(
        unpack_datagram(&datagram[..datagram.len() - 1]),
        Err(Error::ErrLengthMismatch)
    );
    assert_eq!(unpack_datagram(&record_a[..10]), Err(Error::ErrBufferTooShort));
    Ok(())
}

#[test]
fn test_compact_raw_packets() {
    let packets = vec![vec![1u8; 10], vec![2u8; 10], vec![3u8; 30], vec![4u8; 5]];
    let compacted = compact_raw_packets(&packets, 25);
    let lens: Vec<usize> = compacted.iter().map(|p| p.len()).collect();
    assert_eq!(lens, vec![20, 30, 5]);
}

#[test]
fn test_record_layer_application_data() -> Result<()> {
    let record = RecordLayer::new(1, Content::ApplicationData(vec![1, 2, 3]));
    let mut raw = vec![];
    record.marshal(&mut raw)?;
    assert_eq!(raw.len(), RECORD_LAYER_HEADER_SIZE + 3);

    let parsed = RecordLayer::unmarshal(&raw)?;
    assert_eq!(parsed.record_layer_header.content_len, 3);
    assert_eq!(parsed.content, Content::ApplicationData(vec![1, 2, 3]));

    assert_eq!(
        RecordLayer::unmarshal(&raw[..raw.len() - 1]),
        Err(Error::ErrLengthMismatch)
    );
    Ok(())
}
