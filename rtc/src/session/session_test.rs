use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use base::MessageQueueManager;
use shared::error::Error;

use super::fake::FakeSession;
use super::*;
use crate::transport::dtls_transport_channel::DtlsTransportState;

fn wait_until(f: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    f()
}

fn threads() -> Result<(Thread, Thread)> {
    let manager = MessageQueueManager::new();
    let signaling = Thread::spawn("signaling", Arc::clone(&manager))?;
    let worker = Thread::spawn("worker", manager)?;
    Ok((signaling, worker))
}

#[test]
fn test_session_state_and_error_signals() -> Result<()> {
    let (signaling, worker) = threads()?;
    let fake = FakeSession::new("s1", true, &signaling, &worker, SettingEngine::default());
    let session = fake.session();

    let states = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&states);
    session.signals().state.connect(move |_: &SessionState| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    session.set_state(SessionState::SentInitiate);
    session.set_state(SessionState::SentInitiate);
    session.set_state(SessionState::ReceivedAccept);
    assert_eq!(states.load(Ordering::SeqCst), 2);
    assert_eq!(session.state(), SessionState::ReceivedAccept);

    session.post_error(SessionError::Transport);
    assert!(wait_until(|| session.error() == SessionError::Transport));
    assert_eq!(SessionError::Transport.to_string(), "ERROR_TRANSPORT");
    Ok(())
}

#[test]
fn test_session_transport_refcount() -> Result<()> {
    let (signaling, worker) = threads()?;
    let fake = FakeSession::new("s2", false, &signaling, &worker, SettingEngine::default());
    let session = fake.session();

    let first = session.create_channel("audio", "rtp", 1)?;
    let second = session.create_channel("audio", "rtp", 1)?;
    assert!(Arc::ptr_eq(&first, &second));
    assert!(fake.factory().channel("audio", 1).is_some());

    session.destroy_channel("audio", 1);
    assert!(session.has_channel("audio", 1));
    session.destroy_channel("audio", 1);
    assert!(!session.has_channel("audio", 1));
    assert!(fake.factory().channel("audio", 1).is_none());

    // unbalanced destroy is only logged
    session.destroy_channel("audio", 1);
    Ok(())
}

#[test]
fn test_session_applies_identity_and_fingerprint() -> Result<()> {
    let (signaling, worker) = threads()?;
    let fake = FakeSession::new("s3", true, &signaling, &worker, SettingEngine::default());
    let session = fake.session();

    session.create_channel("video", "video_rtp", 1)?;
    let Some(channel) = session.transport_channel("video", 1) else {
        panic!("expected a transport");
    };
    assert_eq!(channel.state(), DtlsTransportState::None);

    let peer = Certificate::generate_self_signed()?;
    let digest = peer.fingerprint("sha-256")?;

    // recorded but not applied without an identity
    session.set_remote_fingerprint("video", "sha-256", &digest)?;
    assert_eq!(channel.state(), DtlsTransportState::None);

    session.set_identity(Some(Certificate::generate_self_signed()?))?;
    assert_eq!(channel.state(), DtlsTransportState::Accepted);
    assert!(channel.is_client());

    // a later transport of the same content picks both up
    session.create_channel("video", "video_rtcp", 2)?;
    let rtcp = session.transport_channel("video", 2).map(|c| c.state());
    assert_eq!(rtcp, Some(DtlsTransportState::Accepted));

    assert_eq!(
        session.set_identity(Some(Certificate::generate_self_signed()?)),
        Err(Error::ErrInvalidDtlsState)
    );
    Ok(())
}
