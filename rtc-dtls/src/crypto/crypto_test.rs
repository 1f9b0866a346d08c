use super::*;

#[test]
fn test_certificate_sign_verify() -> Result<()> {
    let cert = Certificate::generate_self_signed()?;
    let other = Certificate::generate_self_signed()?;

    let signature = cert.sign(b"transcript")?;
    verify_signature(b"transcript", &signature, &cert.certificate)?;

    assert_eq!(
        verify_signature(b"tampered", &signature, &cert.certificate),
        Err(Error::ErrKeySignatureVerifyFailed)
    );
    assert_eq!(
        verify_signature(b"transcript", &signature, &other.certificate),
        Err(Error::ErrKeySignatureVerifyFailed)
    );
    assert_eq!(
        verify_signature(b"transcript", &signature, b"not a certificate"),
        Err(Error::ErrInvalidCertificate)
    );
    Ok(())
}

#[test]
fn test_fingerprint_format() -> Result<()> {
    let sha256 = fingerprint(b"abc", "sha-256")?;
    assert!(sha256.starts_with("ba:78:16:bf:8f:01:cf:ea"));
    assert_eq!(sha256.len(), 32 * 3 - 1);

    let sha1 = fingerprint(b"abc", "sha-1")?;
    assert!(sha1.starts_with("a9:99:3e:36"));
    assert_eq!(sha1.len(), 20 * 3 - 1);

    assert_eq!(
        fingerprint(b"abc", "md5"),
        Err(Error::ErrInvalidFingerprintAlgorithm("md5".to_owned()))
    );
    Ok(())
}

#[test]
fn test_certificate_fingerprints_are_distinct() -> Result<()> {
    let a = Certificate::generate_self_signed()?;
    let b = Certificate::generate_self_signed()?;
    assert_ne!(a.fingerprint("sha-256")?, b.fingerprint("sha-256")?);
    assert_eq!(a.clone().fingerprint("sha-256")?, a.fingerprint("sha-256")?);
    Ok(())
}

#[test]
fn test_value_key_message_layout() {
    let message = value_key_message(&[1u8; 32], &[2u8; 32], &[7u8; 3], NamedCurve::X25519);
    assert_eq!(message.len(), 32 + 32 + 4 + 3);
    assert_eq!(&message[..32], &[1u8; 32]);
    assert_eq!(&message[32..64], &[2u8; 32]);
    assert_eq!(&message[64..], &[0x03, 0x00, 0x1d, 0x03, 7, 7, 7]);
}
