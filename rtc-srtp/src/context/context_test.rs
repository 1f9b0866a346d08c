use super::*;
use shared::error::Error;

const MASTER_KEY: [u8; 16] = [
    0x0d, 0xcd, 0x21, 0x3e, 0x4c, 0xbc, 0xf2, 0x8f, 0x01, 0x7f, 0x69, 0x94, 0x40, 0x1e, 0x28, 0x89,
];
const MASTER_SALT: [u8; 14] = [
    0x62, 0x77, 0x60, 0x38, 0xc0, 0x6d, 0xc9, 0x41, 0x9f, 0x6d, 0xd9, 0x43, 0x3e, 0x7c,
];

fn build_rtp(seq: u16, ssrc: u32, payload: &[u8]) -> Vec<u8> {
    let mut pkt = vec![0x80, 0x60];
    pkt.extend_from_slice(&seq.to_be_bytes());
    pkt.extend_from_slice(&0x1234_5678u32.to_be_bytes());
    pkt.extend_from_slice(&ssrc.to_be_bytes());
    pkt.extend_from_slice(payload);
    pkt
}

fn build_rtcp_rr(ssrc: u32) -> Vec<u8> {
    let mut pkt = vec![0x81, 201, 0x00, 0x07];
    pkt.extend_from_slice(&ssrc.to_be_bytes());
    pkt.extend_from_slice(&[0xAB; 24]);
    pkt
}

fn build_pair(profile: ProtectionProfile) -> Result<(Context, Context)> {
    let encrypt = Context::new(&MASTER_KEY, &MASTER_SALT, profile, None, None)?;
    let decrypt = Context::new(
        &MASTER_KEY,
        &MASTER_SALT,
        profile,
        Some(srtp_replay_protection(64)),
        Some(srtcp_replay_protection(64)),
    )?;
    Ok((encrypt, decrypt))
}

#[test]
fn test_context_rejects_bad_key_len() {
    let result = Context::new(
        &MASTER_KEY[..15],
        &MASTER_SALT,
        ProtectionProfile::Aes128CmHmacSha1_80,
        None,
        None,
    );
    assert!(matches!(result, Err(Error::ErrShortSrtpMasterKey(16, 15))));

    let result = Context::new(
        &MASTER_KEY,
        &MASTER_SALT[..10],
        ProtectionProfile::Aes128CmHmacSha1_80,
        None,
        None,
    );
    assert!(matches!(result, Err(Error::ErrShortSrtpMasterSalt(14, 10))));
}

#[test]
fn test_rtp_round_trip() -> Result<()> {
    for profile in [
        ProtectionProfile::Aes128CmHmacSha1_80,
        ProtectionProfile::Aes128CmHmacSha1_32,
    ] {
        let (mut encrypt, mut decrypt) = build_pair(profile)?;
        let payload = [0x11u8; 40];
        let plain = build_rtp(5000, 0xCAFEBABE, &payload);

        let protected = encrypt.encrypt_rtp(&plain)?;
        assert_eq!(protected.len(), plain.len() + profile.rtp_auth_tag_len());
        assert_eq!(&protected[..12], &plain[..12], "header stays in the clear");
        assert_ne!(&protected[12..plain.len()], &payload[..]);

        let unprotected = decrypt.decrypt_rtp(&protected)?;
        assert_eq!(&unprotected[..], &plain[..]);
    }
    Ok(())
}

#[test]
fn test_rtp_auth_failure() -> Result<()> {
    let (mut encrypt, mut decrypt) = build_pair(ProtectionProfile::Aes128CmHmacSha1_80)?;
    let plain = build_rtp(1, 1, &[0x22; 20]);
    let mut protected = encrypt.encrypt_rtp(&plain)?;
    let last = protected.len() - 1;
    protected[last] ^= 0x01;

    assert_eq!(
        decrypt.decrypt_rtp(&protected),
        Err(Error::ErrFailedToVerifyAuthTag)
    );
    Ok(())
}

#[test]
fn test_rtp_replay_rejected() -> Result<()> {
    let (mut encrypt, mut decrypt) = build_pair(ProtectionProfile::Aes128CmHmacSha1_80)?;
    let protected = encrypt.encrypt_rtp(&build_rtp(7, 42, &[0x33; 20]))?;

    decrypt.decrypt_rtp(&protected)?;
    assert_eq!(
        decrypt.decrypt_rtp(&protected),
        Err(Error::ErrSrtpSsrcDuplicated(42, 7))
    );
    Ok(())
}

#[test]
fn test_rtp_failed_auth_does_not_poison_replay_window() -> Result<()> {
    let (mut encrypt, mut decrypt) = build_pair(ProtectionProfile::Aes128CmHmacSha1_80)?;
    let protected = encrypt.encrypt_rtp(&build_rtp(9, 42, &[0x33; 20]))?;

    let mut tampered = protected.clone();
    tampered[14] ^= 0xFF;
    assert!(decrypt.decrypt_rtp(&tampered).is_err());
    assert!(decrypt.decrypt_rtp(&protected).is_ok());
    Ok(())
}

#[test]
fn test_rtp_rollover() -> Result<()> {
    let (mut encrypt, mut decrypt) = build_pair(ProtectionProfile::Aes128CmHmacSha1_80)?;
    let ssrc = 0x0102_0304;

    for seq in [65533u16, 65534, 65535, 0, 1, 2] {
        let plain = build_rtp(seq, ssrc, &[seq as u8; 16]);
        let protected = encrypt.encrypt_rtp(&plain)?;
        let unprotected = decrypt.decrypt_rtp(&protected)?;
        assert_eq!(&unprotected[..], &plain[..], "seq {seq}");
    }

    assert_eq!(encrypt.get_roc(ssrc), Some(1));
    assert_eq!(decrypt.get_roc(ssrc), Some(1));
    Ok(())
}

#[test]
fn test_rtp_reordered_across_rollover() -> Result<()> {
    let (mut encrypt, mut decrypt) = build_pair(ProtectionProfile::Aes128CmHmacSha1_80)?;
    let ssrc = 77;

    let mut protected = vec![];
    for seq in [65534u16, 65535, 0] {
        protected.push(encrypt.encrypt_rtp(&build_rtp(seq, ssrc, &[1; 8]))?);
    }

    decrypt.decrypt_rtp(&protected[0])?;
    decrypt.decrypt_rtp(&protected[2])?;
    // Late packet from the previous ROC epoch still authenticates.
    decrypt.decrypt_rtp(&protected[1])?;
    Ok(())
}

#[test]
fn test_rtp_set_roc() -> Result<()> {
    let (mut encrypt, mut decrypt) = build_pair(ProtectionProfile::Aes128CmHmacSha1_80)?;
    encrypt.set_roc(5, 3);
    decrypt.set_roc(5, 3);

    let plain = build_rtp(100, 5, &[9; 12]);
    let protected = encrypt.encrypt_rtp(&plain)?;
    assert_eq!(&decrypt.decrypt_rtp(&protected)?[..], &plain[..]);
    assert_eq!(decrypt.get_roc(5), Some(3));
    Ok(())
}

#[test]
fn test_rtp_too_short() -> Result<()> {
    let (mut encrypt, mut decrypt) = build_pair(ProtectionProfile::Aes128CmHmacSha1_80)?;
    assert_eq!(encrypt.encrypt_rtp(&[0x80; 8]), Err(Error::ErrTooShortRtp));
    // Header only, no room for the tag.
    assert_eq!(
        decrypt.decrypt_rtp(&build_rtp(1, 1, &[])),
        Err(Error::ErrTooShortRtp)
    );
    Ok(())
}

#[test]
fn test_rtcp_round_trip() -> Result<()> {
    let (mut encrypt, mut decrypt) = build_pair(ProtectionProfile::Aes128CmHmacSha1_32)?;
    let plain = build_rtcp_rr(0xDEAD_BEEF);

    let protected = encrypt.encrypt_rtcp(&plain)?;
    // E-flag + index, then the 80-bit tag regardless of the RTP tag length.
    assert_eq!(protected.len(), plain.len() + 4 + 10);
    assert_eq!(&protected[..8], &plain[..8]);
    assert_eq!(protected[plain.len()] & 0x80, 0x80);
    assert_eq!(encrypt.get_index(0xDEAD_BEEF), Some(1));

    let unprotected = decrypt.decrypt_rtcp(&protected)?;
    assert_eq!(&unprotected[..], &plain[..]);
    Ok(())
}

#[test]
fn test_rtcp_replay_and_auth() -> Result<()> {
    let (mut encrypt, mut decrypt) = build_pair(ProtectionProfile::Aes128CmHmacSha1_80)?;
    let protected = encrypt.encrypt_rtcp(&build_rtcp_rr(11))?;

    let mut tampered = protected.clone();
    tampered[10] ^= 0x40;
    assert_eq!(
        decrypt.decrypt_rtcp(&tampered),
        Err(Error::ErrFailedToVerifyAuthTag)
    );

    decrypt.decrypt_rtcp(&protected)?;
    assert_eq!(
        decrypt.decrypt_rtcp(&protected),
        Err(Error::ErrSrtcpSsrcDuplicated(11, 1))
    );
    Ok(())
}

#[test]
fn test_rtcp_index_wraps() -> Result<()> {
    let (mut encrypt, mut decrypt) = build_pair(ProtectionProfile::Aes128CmHmacSha1_80)?;
    encrypt.set_index(3, MAX_SRTCP_INDEX - 1);

    let first = encrypt.encrypt_rtcp(&build_rtcp_rr(3))?;
    let second = encrypt.encrypt_rtcp(&build_rtcp_rr(3))?;
    assert_eq!(encrypt.get_index(3), Some(0));

    decrypt.decrypt_rtcp(&first)?;
    decrypt.decrypt_rtcp(&second)?;
    Ok(())
}
