//! Voice calls keyed by DTLS-SRTP between two in-process sessions.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use base::Thread;
use dtls::Certificate;
use srtp::SrtpFilter;

use common::*;
use rtc::channel::VoiceChannel;
use rtc::channel_manager::ChannelManager;
use rtc::configuration::setting_engine::SettingEngine;
use rtc::media::MediaType;
use rtc::media::fake::FakeMediaChannel;
use rtc::session::fake::FakeSession;
use rtc::transport::TransportChannel;
use rtc::transport::dtls_transport_channel::DtlsTransportState;

struct Endpoint {
    fake: FakeSession,
    manager: ChannelManager,
    media: Arc<FakeMediaChannel>,
    voice: Arc<VoiceChannel>,
}

impl Endpoint {
    fn new(
        initiator: bool,
        signaling: &Thread,
        worker: &Thread,
        identity: &Certificate,
        remote_fingerprint: &str,
    ) -> Result<Self> {
        let setting_engine = SettingEngine::default();
        let fake = FakeSession::new("dtls", initiator, signaling, worker, setting_engine.clone());
        fake.session().set_identity(Some(identity.clone()))?;
        fake.session()
            .set_remote_fingerprint("audio", "sha-256", remote_fingerprint)?;

        let manager = ChannelManager::new(worker.clone(), signaling.clone(), setting_engine);
        let media = FakeMediaChannel::new(MediaType::Audio);
        let voice = manager.create_voice_channel(fake.session(), "audio", true, media.clone())?;
        Ok(Endpoint {
            fake,
            manager,
            media,
            voice,
        })
    }

    fn dtls_state(&self, component: u16) -> Option<DtlsTransportState> {
        self.fake
            .session()
            .transport_channel("audio", component)
            .map(|t| t.state())
    }
}

fn call(callee_fingerprint_ok: bool) -> Result<(Endpoint, Endpoint)> {
    let (signaling, worker) = threads()?;
    let caller_cert = Certificate::generate_self_signed()?;
    let callee_cert = Certificate::generate_self_signed()?;

    // the caller may be told to expect a certificate nobody presents
    let expected_callee = if callee_fingerprint_ok {
        callee_cert.fingerprint("sha-256")?
    } else {
        Certificate::generate_self_signed()?.fingerprint("sha-256")?
    };

    let caller = Endpoint::new(true, &signaling, &worker, &caller_cert, &expected_callee)?;
    let callee = Endpoint::new(
        false,
        &signaling,
        &worker,
        &callee_cert,
        &caller_cert.fingerprint("sha-256")?,
    )?;

    // no SDES keys, DTLS provides them
    negotiate(&caller.voice, &callee.voice, &audio_content(), &audio_content())?;
    Ok((caller, callee))
}

#[test]
fn test_dtls_srtp_voice_call() -> Result<()> {
    init_log();
    let (caller, callee) = call(true)?;

    assert_eq!(caller.dtls_state(1), Some(DtlsTransportState::Accepted));
    assert!(!caller.voice.secure());
    assert!(!caller.voice.writable());

    caller.fake.connect(&callee.fake);
    assert!(wait_until(|| caller.voice.writable() && callee.voice.writable()));
    assert!(caller.voice.secure_dtls());
    assert!(callee.voice.secure_dtls());
    assert_eq!(caller.dtls_state(1), Some(DtlsTransportState::Open));
    assert_eq!(caller.dtls_state(2), Some(DtlsTransportState::Open));

    let transport = caller.fake.session().transport_channel("audio", 1);
    assert!(transport.as_ref().is_some_and(|t| t.is_client()));
    let cipher = transport.and_then(|t| t.get_srtp_cipher());
    assert!(cipher.is_some());

    caller.voice.enable(true)?;
    callee.voice.enable(true)?;

    let wire = Arc::new(Mutex::new(vec![]));
    let sink = Arc::clone(&wire);
    caller
        .voice
        .signals()
        .send_packet_post_crypto
        .connect(move |event| {
            if !event.rtcp {
                if let Ok(mut packets) = sink.lock() {
                    packets.push(event.data.clone());
                }
            }
        });

    // 1000 bytes on the way in, each
    let packets: Vec<Vec<u8>> = (1..=100).map(|seq| rtp_packet(seq, 0xcafe, 988)).collect();
    for packet in &packets {
        assert!(caller.media.send_rtp(packet));
    }
    assert!(wait_until(|| callee.media.rtp_packets().len() == packets.len()));
    assert_eq!(callee.media.rtp_packets(), packets);

    let wire = wire.lock().map(|w| w.clone()).unwrap_or_default();
    assert_eq!(wire.len(), packets.len());
    assert!(wire.iter().all(|p| p.len() > 1000));

    // the initiator protects with the server half of the exported material
    let material = caller
        .fake
        .session()
        .transport_channel("audio", 1)
        .map(|t| t.export_keying_material("EXTRACTOR-dtls_srtp", &[], false, 60))
        .transpose()?
        .unwrap_or_default();
    assert_eq!(material.len(), 60);
    let client = [&material[0..16], &material[32..46]].concat();
    let server = [&material[16..32], &material[46..60]].concat();
    let cipher = cipher.unwrap_or_default();
    let mut responder = SrtpFilter::new();
    responder.set_rtp_params(&cipher, &client, &cipher, &server)?;
    assert_eq!(responder.unprotect_rtp(&wire[0])?.to_vec(), packets[0]);

    let reply = rtp_packet(1, 0xbeef, 80);
    assert!(callee.media.send_rtp(&reply));
    assert!(wait_until(|| caller.media.rtp_packets().len() == 1));
    assert_eq!(caller.media.rtp_packets()[0], reply);

    let report = rtcp_receiver_report(0xbeef);
    assert!(callee.media.send_rtcp(&report));
    assert!(wait_until(|| caller.media.rtcp_packets().len() == 1));
    assert_eq!(caller.media.rtcp_packets()[0], report);

    caller.manager.terminate();
    callee.manager.terminate();
    assert!(!caller.fake.session().has_channel("audio", 1));
    assert!(!callee.fake.session().has_channel("audio", 2));
    Ok(())
}

#[test]
fn test_dtls_srtp_fingerprint_mismatch_blocks_media() -> Result<()> {
    init_log();
    let (caller, callee) = call(false)?;

    caller.fake.connect(&callee.fake);
    assert!(wait_until(
        || caller.dtls_state(1) == Some(DtlsTransportState::Closed)
    ));

    std::thread::sleep(Duration::from_millis(100));
    assert!(!caller.voice.writable());
    assert!(!caller.voice.secure());
    assert!(!caller.voice.was_ever_writable());

    caller.voice.enable(true)?;
    assert!(!caller.media.send_rtp(&rtp_packet(1, 0xcafe, 80)));
    assert!(callee.media.rtp_packets().is_empty());
    Ok(())
}
