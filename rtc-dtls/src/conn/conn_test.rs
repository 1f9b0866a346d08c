use std::time::Duration;

use super::*;
use crate::config::{
    ClientAuthType, ConfigBuilder, ExtendedMasterSecretType, VerifyPeerCertificateFn,
};
use crate::crypto::Certificate;
use crate::extension::extension_use_srtp::SrtpProtectionProfile;

fn build_conn(builder: ConfigBuilder, is_client: bool) -> Result<DTLSConn> {
    DTLSConn::new(builder.build(is_client)?)
}

fn pipe_with(client: ConfigBuilder, server: ConfigBuilder) -> Result<(DTLSConn, DTLSConn)> {
    let _ = env_logger::builder().is_test(true).try_init();
    Ok((build_conn(client, true)?, build_conn(server, false)?))
}

fn pipe() -> Result<(DTLSConn, DTLSConn)> {
    pipe_with(
        ConfigBuilder::default().with_certificate(Certificate::generate_self_signed()?),
        ConfigBuilder::default()
            .with_certificate(Certificate::generate_self_signed()?)
            .with_client_auth(ClientAuthType::RequireAnyClientCert),
    )
}

/// Delivers every pending datagram of `from` to `to`.
fn flush(from: &mut DTLSConn, to: &mut DTLSConn, now: Instant) -> Result<usize> {
    let mut n = 0;
    while let Some(pkt) = from.poll_write() {
        to.handle_read(&pkt, now)?;
        n += 1;
    }
    Ok(n)
}

fn drain(conn: &mut DTLSConn) -> usize {
    let mut n = 0;
    while conn.poll_write().is_some() {
        n += 1;
    }
    n
}

fn run_handshake(client: &mut DTLSConn, server: &mut DTLSConn, now: Instant) -> Result<()> {
    client.start(now)?;
    server.start(now)?;
    for _ in 0..16 {
        let a = flush(client, server, now)?;
        let b = flush(server, client, now)?;
        if a == 0 && b == 0 {
            break;
        }
    }
    Ok(())
}

fn events(conn: &mut DTLSConn) -> Vec<DtlsEvent> {
    let mut out = vec![];
    while let Some(e) = conn.poll_event() {
        out.push(e);
    }
    out
}

#[test]
fn test_handshake_completes() -> Result<()> {
    let (mut client, mut server) = pipe()?;
    let client_cert = client.cfg.local_certificate.certificate.clone();
    let server_cert = server.cfg.local_certificate.certificate.clone();

    run_handshake(&mut client, &mut server, Instant::now())?;

    assert!(client.is_handshake_completed());
    assert!(server.is_handshake_completed());
    assert_eq!(events(&mut client), vec![DtlsEvent::HandshakeCompleted]);
    assert_eq!(events(&mut server), vec![DtlsEvent::HandshakeCompleted]);
    assert_eq!(client.poll_timeout(), None);
    assert_eq!(server.poll_timeout(), None);

    assert_eq!(
        client.selected_srtp_protection_profile(),
        SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80
    );
    assert_eq!(
        server.selected_srtp_protection_profile(),
        SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80
    );
    assert_eq!(client.peer_certificate(), Some(server_cert.as_slice()));
    assert_eq!(server.peer_certificate(), Some(client_cert.as_slice()));

    let client_keys = client.export_keying_material("EXTRACTOR-dtls_srtp", &[], 60)?;
    let server_keys = server.export_keying_material("EXTRACTOR-dtls_srtp", &[], 60)?;
    assert_eq!(client_keys.len(), 60);
    assert_eq!(client_keys, server_keys);
    Ok(())
}

#[test]
fn test_application_data() -> Result<()> {
    let (mut client, mut server) = pipe()?;
    assert_eq!(client.write(b"early"), Err(Error::ErrHandshakeInProgress));

    let now = Instant::now();
    run_handshake(&mut client, &mut server, now)?;

    client.write(b"ping")?;
    flush(&mut client, &mut server, now)?;
    assert_eq!(
        server.incoming_application_data(),
        Some(BytesMut::from(&b"ping"[..]))
    );

    server.write(b"pong")?;
    flush(&mut server, &mut client, now)?;
    assert_eq!(
        client.incoming_application_data(),
        Some(BytesMut::from(&b"pong"[..]))
    );
    assert_eq!(client.incoming_application_data(), None);
    Ok(())
}

#[test]
fn test_replayed_record_is_dropped() -> Result<()> {
    let (mut client, mut server) = pipe()?;
    let now = Instant::now();
    run_handshake(&mut client, &mut server, now)?;

    client.write(b"once")?;
    let Some(pkt) = client.poll_write() else {
        panic!("expected an application data record");
    };
    server.handle_read(&pkt, now)?;
    server.handle_read(&pkt, now)?;

    assert!(server.incoming_application_data().is_some());
    assert_eq!(server.incoming_application_data(), None);
    Ok(())
}

#[test]
fn test_peer_certificate_rejected() -> Result<()> {
    let unrelated = Certificate::generate_self_signed()?;
    let expected = unrelated.fingerprint("sha-256")?;
    let verify: VerifyPeerCertificateFn = std::sync::Arc::new(move |cert: &[u8]| {
        if crate::crypto::fingerprint(cert, "sha-256")? == expected {
            Ok(())
        } else {
            Err(Error::ErrNoMatchingCertificateFingerprint)
        }
    });

    let (mut client, mut server) = pipe_with(
        ConfigBuilder::default()
            .with_certificate(Certificate::generate_self_signed()?)
            .with_verify_peer_certificate(Some(verify)),
        ConfigBuilder::default().with_certificate(Certificate::generate_self_signed()?),
    )?;

    let result = run_handshake(&mut client, &mut server, Instant::now());
    assert_eq!(result, Err(Error::ErrNoMatchingCertificateFingerprint));
    assert!(client.is_closed());
    assert!(!client.is_handshake_completed());
    assert_eq!(events(&mut client), vec![DtlsEvent::Closed]);

    // the fatal alert reaches the server
    assert_eq!(
        flush(&mut client, &mut server, Instant::now()),
        Err(Error::ErrAlertReceived)
    );
    assert!(server.is_closed());
    assert_eq!(events(&mut server), vec![DtlsEvent::Closed]);
    Ok(())
}

#[test]
fn test_no_common_srtp_profile() -> Result<()> {
    let (mut client, mut server) = pipe_with(
        ConfigBuilder::default()
            .with_certificate(Certificate::generate_self_signed()?)
            .with_srtp_protection_profiles(vec![
                SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_32,
            ]),
        ConfigBuilder::default()
            .with_certificate(Certificate::generate_self_signed()?)
            .with_srtp_protection_profiles(vec![
                SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80,
            ]),
    )?;

    let now = Instant::now();
    client.start(now)?;
    server.start(now)?;
    assert_eq!(
        flush(&mut client, &mut server, now),
        Err(Error::ErrNoSrtpProtectionProfile)
    );
    assert!(server.is_closed());
    Ok(())
}

#[test]
fn test_lost_client_hello_is_retransmitted() -> Result<()> {
    let (mut client, mut server) = pipe()?;
    let now = Instant::now();

    client.start(now)?;
    server.start(now)?;
    assert_eq!(drain(&mut client), 1);
    assert_eq!(client.poll_timeout(), Some(now + Duration::from_secs(1)));

    // nothing happens before the deadline
    client.handle_timeout(now + Duration::from_millis(500))?;
    assert_eq!(drain(&mut client), 0);

    let later = now + Duration::from_secs(1);
    client.handle_timeout(later)?;
    run_handshake(&mut client, &mut server, later)?;

    assert!(client.is_handshake_completed());
    assert!(server.is_handshake_completed());
    Ok(())
}

#[test]
fn test_lost_hello_verify_request_is_answered_again() -> Result<()> {
    let (mut client, mut server) = pipe()?;
    let now = Instant::now();

    client.start(now)?;
    server.start(now)?;
    flush(&mut client, &mut server, now)?;
    // the server keeps no timer of its own before the cookie round trip
    assert_eq!(server.poll_timeout(), None);
    assert_eq!(drain(&mut server), 1);
    let cookie = server.state.cookie.clone();
    assert!(!cookie.is_empty());

    let Some(deadline) = client.poll_timeout() else {
        panic!("client should be waiting for the server flight");
    };
    client.handle_timeout(deadline)?;
    run_handshake(&mut client, &mut server, deadline)?;

    assert_eq!(server.state.cookie, cookie);
    assert_eq!(client.state.cookie, cookie);
    assert!(client.is_handshake_completed());
    assert!(server.is_handshake_completed());
    Ok(())
}

#[test]
fn test_insecure_skip_hello_verify() -> Result<()> {
    let (mut client, mut server) = pipe_with(
        ConfigBuilder::default().with_certificate(Certificate::generate_self_signed()?),
        ConfigBuilder::default()
            .with_certificate(Certificate::generate_self_signed()?)
            .with_insecure_skip_hello_verify(true),
    )?;
    let now = Instant::now();

    client.start(now)?;
    server.start(now)?;
    flush(&mut client, &mut server, now)?;
    flush(&mut server, &mut client, now)?;
    assert!(client.state.cookie.is_empty());

    flush(&mut client, &mut server, now)?;
    flush(&mut server, &mut client, now)?;
    assert!(client.is_handshake_completed());
    assert!(server.is_handshake_completed());
    assert_eq!(
        client.export_keying_material("EXTRACTOR-dtls_srtp", &[], 60)?,
        server.export_keying_material("EXTRACTOR-dtls_srtp", &[], 60)?
    );
    Ok(())
}

#[test]
fn test_lost_last_flight_is_retransmitted() -> Result<()> {
    let (mut client, mut server) = pipe()?;
    let now = Instant::now();

    client.start(now)?;
    server.start(now)?;
    // ClientHello, HelloVerifyRequest, ClientHello, server hello flight
    flush(&mut client, &mut server, now)?;
    flush(&mut server, &mut client, now)?;
    flush(&mut client, &mut server, now)?;
    flush(&mut server, &mut client, now)?;
    flush(&mut client, &mut server, now)?;
    assert!(server.is_handshake_completed());

    // the server's last flight never arrives
    assert!(drain(&mut server) > 0);
    assert!(!client.is_handshake_completed());
    assert_eq!(server.poll_timeout(), None);

    let Some(deadline) = client.poll_timeout() else {
        panic!("client should be waiting for the server flight");
    };
    client.handle_timeout(deadline)?;
    flush(&mut client, &mut server, deadline)?;
    flush(&mut server, &mut client, deadline)?;

    assert!(client.is_handshake_completed());
    assert_eq!(client.poll_timeout(), None);
    assert_eq!(
        client.export_keying_material("EXTRACTOR-dtls_srtp", &[], 60)?,
        server.export_keying_material("EXTRACTOR-dtls_srtp", &[], 60)?
    );
    Ok(())
}

#[test]
fn test_handshake_without_client_certificate() -> Result<()> {
    let (mut client, mut server) = pipe_with(
        ConfigBuilder::default().with_certificate(Certificate::generate_self_signed()?),
        ConfigBuilder::default().with_certificate(Certificate::generate_self_signed()?),
    )?;
    let server_cert = server.cfg.local_certificate.certificate.clone();

    run_handshake(&mut client, &mut server, Instant::now())?;

    assert!(server.is_handshake_completed());
    assert!(!client.state.remote_requested_certificate);
    assert_eq!(server.peer_certificate(), None);
    assert_eq!(client.peer_certificate(), Some(server_cert.as_slice()));
    Ok(())
}

#[test]
fn test_client_certificate_required() -> Result<()> {
    let (mut client, mut server) = pipe_with(
        ConfigBuilder::default().with_certificate(Certificate::generate_self_signed()?),
        ConfigBuilder::default().with_certificate(Certificate::generate_self_signed()?),
    )?;
    let now = Instant::now();

    client.start(now)?;
    server.start(now)?;
    flush(&mut client, &mut server, now)?;
    flush(&mut server, &mut client, now)?;
    flush(&mut client, &mut server, now)?;
    flush(&mut server, &mut client, now)?;

    // no CertificateRequest went out, so the client flight carries no certificate
    server.cfg.client_auth = ClientAuthType::RequireAnyClientCert;
    assert_eq!(
        flush(&mut client, &mut server, now),
        Err(Error::ErrClientCertificateRequired)
    );
    assert!(server.is_closed());
    assert!(!server.is_handshake_completed());
    Ok(())
}

#[test]
fn test_extended_master_secret_negotiation() -> Result<()> {
    let (mut client, mut server) = pipe()?;
    run_handshake(&mut client, &mut server, Instant::now())?;
    assert!(client.state.extended_master_secret);
    assert!(server.state.extended_master_secret);

    let (mut client, mut server) = pipe_with(
        ConfigBuilder::default()
            .with_certificate(Certificate::generate_self_signed()?)
            .with_extended_master_secret(ExtendedMasterSecretType::Disable),
        ConfigBuilder::default().with_certificate(Certificate::generate_self_signed()?),
    )?;
    run_handshake(&mut client, &mut server, Instant::now())?;
    assert!(client.is_handshake_completed());
    assert!(!client.state.extended_master_secret);
    assert!(!server.state.extended_master_secret);
    assert_eq!(
        client.export_keying_material("EXTRACTOR-dtls_srtp", &[], 60)?,
        server.export_keying_material("EXTRACTOR-dtls_srtp", &[], 60)?
    );
    Ok(())
}

#[test]
fn test_extended_master_secret_required() -> Result<()> {
    let (mut client, mut server) = pipe_with(
        ConfigBuilder::default()
            .with_certificate(Certificate::generate_self_signed()?)
            .with_extended_master_secret(ExtendedMasterSecretType::Disable),
        ConfigBuilder::default()
            .with_certificate(Certificate::generate_self_signed()?)
            .with_extended_master_secret(ExtendedMasterSecretType::Require),
    )?;
    assert_eq!(
        run_handshake(&mut client, &mut server, Instant::now()),
        Err(Error::ErrServerRequiredButNoClientEms)
    );
    assert!(server.is_closed());

    let (mut client, mut server) = pipe_with(
        ConfigBuilder::default()
            .with_certificate(Certificate::generate_self_signed()?)
            .with_extended_master_secret(ExtendedMasterSecretType::Require),
        ConfigBuilder::default()
            .with_certificate(Certificate::generate_self_signed()?)
            .with_extended_master_secret(ExtendedMasterSecretType::Disable),
    )?;
    assert_eq!(
        run_handshake(&mut client, &mut server, Instant::now()),
        Err(Error::ErrClientRequiredButNoServerEms)
    );
    assert!(client.is_closed());
    Ok(())
}

#[test]
fn test_handshake_timeout() -> Result<()> {
    let mut client = build_conn(
        ConfigBuilder::default()
            .with_certificate(Certificate::generate_self_signed()?)
            .with_flight_interval(Duration::from_millis(100))
            .with_max_retransmits(2),
        true,
    )?;

    client.start(Instant::now())?;
    drain(&mut client);

    let mut result = Ok(());
    for _ in 0..3 {
        let Some(deadline) = client.poll_timeout() else {
            panic!("retransmit timer should be armed");
        };
        result = client.handle_timeout(deadline);
        if result.is_err() {
            break;
        }
        assert_eq!(drain(&mut client), 1);
    }

    assert_eq!(result, Err(Error::ErrHandshakeTimeout));
    assert!(client.is_closed());
    assert_eq!(client.poll_timeout(), None);
    assert_eq!(events(&mut client), vec![DtlsEvent::Closed]);
    Ok(())
}

#[test]
fn test_export_keying_material_rules() -> Result<()> {
    let (mut client, mut server) = pipe()?;
    assert_eq!(
        client.export_keying_material("EXTRACTOR-dtls_srtp", &[], 60),
        Err(Error::ErrHandshakeInProgress)
    );

    run_handshake(&mut client, &mut server, Instant::now())?;

    for label in INVALID_KEYING_LABELS {
        assert_eq!(
            client.export_keying_material(label, &[], 32),
            Err(Error::ErrReservedExportKeyingMaterial)
        );
    }
    assert_eq!(
        client.export_keying_material("EXTRACTOR-dtls_srtp", &[1], 60),
        Err(Error::ErrContextUnsupported)
    );
    assert_ne!(
        client.export_keying_material("label-a", &[], 32)?,
        client.export_keying_material("label-b", &[], 32)?
    );
    Ok(())
}

#[test]
fn test_close_notify() -> Result<()> {
    let (mut client, mut server) = pipe()?;
    let now = Instant::now();
    run_handshake(&mut client, &mut server, now)?;
    events(&mut client);
    events(&mut server);

    client.close();
    assert!(client.is_closed());
    assert_eq!(client.write(b"late"), Err(Error::ErrConnClosed));

    flush(&mut client, &mut server, now)?;
    assert!(server.is_closed());
    assert_eq!(events(&mut server), vec![DtlsEvent::Closed]);

    // the server answers with its own close_notify
    assert_eq!(drain(&mut server), 1);
    Ok(())
}

#[test]
fn test_application_data_in_epoch_zero() -> Result<()> {
    let (_, mut server) = pipe()?;
    let now = Instant::now();
    server.start(now)?;

    let record = RecordLayer::new(0, Content::ApplicationData(vec![1, 2, 3]));
    let mut raw = vec![];
    record.marshal(&mut raw)?;

    assert_eq!(
        server.handle_read(&raw, now),
        Err(Error::ErrApplicationDataEpochZero)
    );
    Ok(())
}
