use std::sync::atomic::{AtomicBool, Ordering};

use base::MessageQueueManager;
use srtp::protection_profile::{CS_AES_CM_128_HMAC_SHA1_32, CS_AES_CM_128_HMAC_SHA1_80};

use super::*;
use crate::transport::fake::FakeTransportChannel;

fn wait_until(f: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    f()
}

struct Pair {
    _thread: Thread,
    raw_a: Arc<FakeTransportChannel>,
    raw_b: Arc<FakeTransportChannel>,
    a: Arc<DtlsTransportChannel>,
    b: Arc<DtlsTransportChannel>,
    cert_a: Certificate,
    cert_b: Certificate,
}

fn pair() -> Result<Pair> {
    let thread = Thread::spawn("dtls", MessageQueueManager::new())?;
    let raw_a = FakeTransportChannel::new("audio", 1, thread.clone());
    let raw_b = FakeTransportChannel::new("audio", 1, thread.clone());
    let setting_engine = SettingEngine::default();
    let a = DtlsTransportChannel::new(raw_a.clone(), thread.clone(), true, &setting_engine);
    let b = DtlsTransportChannel::new(raw_b.clone(), thread.clone(), false, &setting_engine);
    Ok(Pair {
        _thread: thread,
        raw_a,
        raw_b,
        a,
        b,
        cert_a: Certificate::generate_self_signed()?,
        cert_b: Certificate::generate_self_signed()?,
    })
}

fn collect(channel: &DtlsTransportChannel) -> Arc<Mutex<Vec<ReceivedPacket>>> {
    let received = Arc::new(Mutex::new(vec![]));
    let sink = Arc::clone(&received);
    channel.on_read_packet(Box::new(move |packet: &ReceivedPacket| {
        lock(&sink).push(packet.clone());
    }));
    received
}

#[test]
fn test_dtls_transport_pass_through_without_identity() -> Result<()> {
    let p = pair()?;
    let received = collect(&p.b);

    assert!(!p.a.is_dtls_active());
    assert_eq!(p.a.state(), DtlsTransportState::None);
    assert_eq!(p.a.set_local_identity(None), Ok(()));

    FakeTransportChannel::connect(&p.raw_a, &p.raw_b);
    assert!(p.a.writable());
    assert_eq!(p.a.send_packet(b"plain", PF_NORMAL)?, 5);
    assert!(wait_until(|| lock(&received).len() == 1));
    assert_eq!(lock(&received)[0].data, b"plain".to_vec());
    assert_eq!(lock(&received)[0].flags, PF_NORMAL);
    assert_eq!(p.a.get_srtp_cipher(), None);
    Ok(())
}

#[test]
fn test_dtls_transport_handshake_and_bypass() -> Result<()> {
    let p = pair()?;
    let received_b = collect(&p.b);

    p.a.set_local_identity(Some(p.cert_a.clone()))?;
    p.b.set_local_identity(Some(p.cert_b.clone()))?;
    assert!(p.a.is_dtls_active());
    p.a.set_srtp_ciphers(&[
        CS_AES_CM_128_HMAC_SHA1_32.to_owned(),
        CS_AES_CM_128_HMAC_SHA1_80.to_owned(),
    ])?;
    p.b.set_srtp_ciphers(&[CS_AES_CM_128_HMAC_SHA1_80.to_owned()])?;
    p.a.set_remote_fingerprint("sha-256", &p.cert_b.fingerprint("sha-256")?)?;
    p.b.set_remote_fingerprint("sha-256", &p.cert_a.fingerprint("sha-256")?.to_uppercase())?;
    assert_eq!(p.a.state(), DtlsTransportState::Accepted);
    assert!(!p.a.writable());

    // nothing goes out before the handshake completed
    assert_eq!(
        p.a.send_packet(b"early", PF_NORMAL),
        Err(Error::ErrTransportNotWritable)
    );

    let writable_a = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&writable_a);
    p.a.on_writable_state(Box::new(move |w: &bool| flag.store(*w, Ordering::SeqCst)));

    FakeTransportChannel::connect(&p.raw_a, &p.raw_b);
    assert!(wait_until(|| p.a.writable() && p.b.writable()));
    assert!(wait_until(|| writable_a.load(Ordering::SeqCst)));
    assert_eq!(p.a.state(), DtlsTransportState::Open);
    assert_eq!(p.b.state(), DtlsTransportState::Open);
    assert_eq!(p.a.remote_certificate(), Some(p.cert_b.certificate.clone()));

    assert_eq!(
        p.a.get_srtp_cipher().as_deref(),
        Some(CS_AES_CM_128_HMAC_SHA1_80)
    );
    assert_eq!(p.a.get_srtp_cipher(), p.b.get_srtp_cipher());

    let key_a = p.a.export_keying_material("EXTRACTOR-dtls_srtp", &[], false, 60)?;
    let key_b = p.b.export_keying_material("EXTRACTOR-dtls_srtp", &[], false, 60)?;
    assert_eq!(key_a.len(), 60);
    assert_eq!(key_a, key_b);

    // ciphers are frozen once the handshake ran
    assert_eq!(
        p.a.set_srtp_ciphers(&[CS_AES_CM_128_HMAC_SHA1_32.to_owned()]),
        Err(Error::ErrInvalidDtlsState)
    );

    let mut rtp = vec![0u8; 100];
    rtp[0] = 0x80;
    assert_eq!(p.a.send_packet(&rtp, PF_SRTP_BYPASS)?, 100);
    assert_eq!(
        p.a.send_packet(&[0x17u8; 20], PF_SRTP_BYPASS),
        Err(Error::ErrInvalidRtpHeader)
    );
    assert_eq!(p.a.send_packet(b"app data", PF_NORMAL)?, 8);

    assert!(wait_until(|| lock(&received_b).len() == 2));
    let received = lock(&received_b).clone();
    assert_eq!(received[0].data, rtp);
    assert_eq!(received[0].flags, PF_SRTP_BYPASS);
    assert_eq!(received[1].data, b"app data".to_vec());
    assert_eq!(received[1].flags, PF_NORMAL);

    p.a.close();
    assert_eq!(p.a.state(), DtlsTransportState::Closed);
    assert!(!p.a.writable());
    Ok(())
}

#[test]
fn test_dtls_transport_fingerprint_mismatch() -> Result<()> {
    let p = pair()?;
    let other = Certificate::generate_self_signed()?;

    p.a.set_local_identity(Some(p.cert_a.clone()))?;
    p.b.set_local_identity(Some(p.cert_b.clone()))?;
    p.a.set_remote_fingerprint("sha-256", &other.fingerprint("sha-256")?)?;
    p.b.set_remote_fingerprint("sha-256", &p.cert_a.fingerprint("sha-256")?)?;

    FakeTransportChannel::connect(&p.raw_a, &p.raw_b);
    assert!(wait_until(|| p.a.state() == DtlsTransportState::Closed));
    assert!(!p.a.writable());
    assert!(p.a.export_keying_material("EXTRACTOR-dtls_srtp", &[], false, 60).is_err());
    Ok(())
}

#[test]
fn test_dtls_transport_state_rules() -> Result<()> {
    let p = pair()?;

    assert_eq!(
        p.a.set_remote_fingerprint("sha-256", "00"),
        Err(Error::ErrInvalidDtlsState)
    );
    p.a.set_local_identity(Some(p.cert_a.clone()))?;
    // same identity again is accepted, a different one is not
    p.a.set_local_identity(Some(p.cert_a.clone()))?;
    assert_eq!(
        p.a.set_local_identity(Some(p.cert_b.clone())),
        Err(Error::ErrInvalidDtlsState)
    );
    assert_eq!(
        p.a.set_remote_fingerprint("md5", "00"),
        Err(Error::ErrInvalidFingerprintAlgorithm("md5".to_owned()))
    );

    // an empty algorithm means the peer does not do DTLS
    p.a.set_remote_fingerprint("", "")?;
    assert_eq!(p.a.state(), DtlsTransportState::None);
    assert!(!p.a.is_dtls_active());
    Ok(())
}
