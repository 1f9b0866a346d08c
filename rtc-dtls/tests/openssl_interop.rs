//! Handshakes against OpenSSL over an in-memory datagram pipe.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::time::Instant;

use anyhow::{Result, bail};
use openssl::pkey::{PKey, Private};
use openssl::srtp::SrtpProfileId;
use openssl::ssl::{
    ErrorCode, Ssl, SslContext, SslContextBuilder, SslMethod, SslOptions, SslStream, SslVerifyMode,
};
use openssl::x509::X509;
use rtc_dtls::{
    Certificate, ClientAuthType, ConfigBuilder, DTLSConn, ExtendedMasterSecretType,
    SrtpProtectionProfile,
};
use shared::crypto::KeyingMaterialExporter;

const SRTP_LABEL: &str = "EXTRACTOR-dtls_srtp";
const SRTP_KEYING_MATERIAL_LEN: usize = 60;

#[derive(Default)]
struct Wire {
    to_openssl: VecDeque<Vec<u8>>,
    from_openssl: VecDeque<Vec<u8>>,
}

/// The OpenSSL end of the pipe. Every write is one datagram.
struct DatagramPipe(Rc<RefCell<Wire>>);

impl Read for DatagramPipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(datagram) = self.0.borrow_mut().to_openssl.pop_front() else {
            return Err(io::ErrorKind::WouldBlock.into());
        };
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok(n)
    }
}

impl Write for DatagramPipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().from_openssl.push_back(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct OpensslPeer {
    context: SslContext,
    certificate: Vec<u8>,
}

fn openssl_peer(is_server: bool, cookie_exchange: bool) -> Result<OpensslPeer> {
    let key_pair = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)?;
    let cert = rcgen::CertificateParams::new(vec!["openssl".to_owned()])?.self_signed(&key_pair)?;

    let mut builder = SslContextBuilder::new(SslMethod::dtls())?;
    builder.set_cipher_list("ECDHE-ECDSA-AES128-GCM-SHA256")?;
    builder.set_tlsext_use_srtp("SRTP_AES128_CM_SHA1_80")?;
    let x509: X509 = X509::from_der(cert.der())?;
    builder.set_certificate(&x509)?;
    let pkey: PKey<Private> = PKey::private_key_from_pkcs8(&key_pair.serialize_der())?;
    builder.set_private_key(&pkey)?;
    builder.check_private_key()?;
    builder.set_options(SslOptions::NO_QUERY_MTU);

    // self-signed peers, the fingerprint is compared by the test
    let mode = if is_server {
        SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT
    } else {
        SslVerifyMode::PEER
    };
    builder.set_verify_callback(mode, |_, _| true);

    if cookie_exchange {
        builder.set_options(SslOptions::COOKIE_EXCHANGE);
        builder.set_cookie_generate_cb(|_, buf| {
            let cookie = b"openssl-interop-cookie";
            buf[..cookie.len()].copy_from_slice(cookie);
            Ok(cookie.len())
        });
        builder.set_cookie_verify_cb(|_, cookie| cookie == b"openssl-interop-cookie");
    }

    Ok(OpensslPeer {
        context: builder.build(),
        certificate: cert.der().to_vec(),
    })
}

struct Outcome {
    wire: Rc<RefCell<Wire>>,
    stream: SslStream<DatagramPipe>,
    openssl_keying_material: Vec<u8>,
    openssl_srtp_profile: Option<SrtpProfileId>,
    openssl_peer_certificate: Option<Vec<u8>>,
}

/// Runs both state machines until each side reports completion.
fn drive(peer: &OpensslPeer, is_openssl_server: bool, conn: &mut DTLSConn) -> Result<Outcome> {
    let wire = Rc::new(RefCell::new(Wire::default()));

    let mut ssl = Ssl::new(&peer.context)?;
    ssl.set_mtu(1200)?;
    if is_openssl_server {
        ssl.set_accept_state();
    } else {
        ssl.set_connect_state();
    }
    let mut stream = SslStream::new(ssl, DatagramPipe(Rc::clone(&wire)))?;

    let now = Instant::now();
    conn.start(now)?;

    let mut openssl_done = false;
    for _ in 0..32 {
        while let Some(datagram) = conn.poll_write() {
            wire.borrow_mut().to_openssl.push_back(datagram.to_vec());
        }

        if !openssl_done {
            match stream.do_handshake() {
                Ok(()) => openssl_done = true,
                Err(err) if err.code() == ErrorCode::WANT_READ => {}
                Err(err) => bail!("openssl handshake failed: {err}"),
            }
        }

        loop {
            let datagram = wire.borrow_mut().from_openssl.pop_front();
            let Some(datagram) = datagram else {
                break;
            };
            conn.handle_read(&datagram, now)?;
        }

        if openssl_done && conn.is_handshake_completed() {
            let mut keying_material = vec![0u8; SRTP_KEYING_MATERIAL_LEN];
            stream
                .ssl()
                .export_keying_material(&mut keying_material, SRTP_LABEL, None)?;
            let openssl_srtp_profile = stream.ssl().selected_srtp_profile().map(|p| p.id());
            let openssl_peer_certificate = stream
                .ssl()
                .peer_certificate()
                .map(|c| c.to_der())
                .transpose()?;
            return Ok(Outcome {
                wire,
                stream,
                openssl_keying_material: keying_material,
                openssl_srtp_profile,
                openssl_peer_certificate,
            });
        }
    }
    bail!("handshake did not complete")
}

fn check(
    conn: &DTLSConn,
    local: &Certificate,
    peer: &OpensslPeer,
    outcome: &Outcome,
) -> Result<()> {
    assert_eq!(
        conn.export_keying_material(SRTP_LABEL, &[], SRTP_KEYING_MATERIAL_LEN)?,
        outcome.openssl_keying_material
    );
    assert_eq!(
        conn.selected_srtp_protection_profile(),
        SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80
    );
    assert_eq!(
        outcome.openssl_srtp_profile,
        Some(SrtpProfileId::SRTP_AES128_CM_SHA1_80)
    );
    assert_eq!(conn.peer_certificate(), Some(peer.certificate.as_slice()));
    assert_eq!(
        outcome.openssl_peer_certificate.as_deref(),
        Some(local.certificate.as_slice())
    );
    Ok(())
}

/// Sends one message each way over the established session.
fn exchange_application_data(conn: &mut DTLSConn, outcome: &mut Outcome) -> Result<()> {
    conn.write(b"from rtc-dtls")?;
    while let Some(datagram) = conn.poll_write() {
        outcome.wire.borrow_mut().to_openssl.push_back(datagram.to_vec());
    }
    let mut buf = [0u8; 64];
    let n = outcome.stream.read(&mut buf)?;
    assert_eq!(&buf[..n], b"from rtc-dtls");

    outcome.stream.write_all(b"from openssl")?;
    loop {
        let datagram = outcome.wire.borrow_mut().from_openssl.pop_front();
        let Some(datagram) = datagram else {
            break;
        };
        conn.handle_read(&datagram, Instant::now())?;
    }
    assert_eq!(
        conn.incoming_application_data().as_deref(),
        Some(&b"from openssl"[..])
    );
    Ok(())
}

#[test]
fn test_client_against_openssl_server() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    for cookie_exchange in [true, false] {
        let peer = openssl_peer(true, cookie_exchange)?;
        let local = Certificate::generate_self_signed()?;
        let mut conn = DTLSConn::new(
            ConfigBuilder::default()
                .with_certificate(local.clone())
                .build(true)?,
        )?;

        let mut outcome = drive(&peer, true, &mut conn)?;
        check(&conn, &local, &peer, &outcome)?;
        exchange_application_data(&mut conn, &mut outcome)?;
    }
    Ok(())
}

#[test]
fn test_server_against_openssl_client() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let peer = openssl_peer(false, false)?;
    let local = Certificate::generate_self_signed()?;
    let mut conn = DTLSConn::new(
        ConfigBuilder::default()
            .with_certificate(local.clone())
            .with_client_auth(ClientAuthType::RequireAnyClientCert)
            .build(false)?,
    )?;

    let mut outcome = drive(&peer, false, &mut conn)?;
    check(&conn, &local, &peer, &outcome)?;
    exchange_application_data(&mut conn, &mut outcome)?;
    Ok(())
}

#[test]
fn test_server_requires_extended_master_secret_from_openssl() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let peer = openssl_peer(false, false)?;
    let local = Certificate::generate_self_signed()?;
    let mut conn = DTLSConn::new(
        ConfigBuilder::default()
            .with_certificate(local.clone())
            .with_client_auth(ClientAuthType::RequireAnyClientCert)
            .with_extended_master_secret(ExtendedMasterSecretType::Require)
            .build(false)?,
    )?;

    let outcome = drive(&peer, false, &mut conn)?;
    check(&conn, &local, &peer, &outcome)?;
    Ok(())
}
