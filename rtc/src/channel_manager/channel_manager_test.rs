use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use base::MessageQueueManager;

use super::*;
use crate::media::MediaChannelError;
use crate::media::codec::Codec;
use crate::media::content_description::MediaContentDescription;
use crate::media::data::{ReceiveDataParams, ReceivedData, SendDataParams};
use crate::media::fake::{FakeMediaChannel, FakeScreenCapturerFactory};
use crate::media::stream_params::StreamParams;
use crate::media::video::{
    CaptureEvent, ScreenCapturerFactory, ScreencastId, StaticVideoView, VideoCapturer,
    ViewRequest, WindowEvent,
};
use crate::session::fake::FakeSession;
use shared::ContentAction;

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

struct Fixture {
    manager: ChannelManager,
    caller: FakeSession,
    callee: FakeSession,
}

fn fixture(setting_engine: SettingEngine) -> Result<Fixture> {
    let queues = MessageQueueManager::new();
    let signaling = Thread::spawn("signaling", Arc::clone(&queues))?;
    let worker = Thread::spawn("worker", queues)?;
    let caller = FakeSession::new("s", true, &signaling, &worker, setting_engine.clone());
    let callee = FakeSession::new("s", false, &signaling, &worker, setting_engine.clone());
    Ok(Fixture {
        manager: ChannelManager::new(worker, signaling, setting_engine),
        caller,
        callee,
    })
}

fn content(media_type: MediaType) -> MediaContentDescription {
    let mut content = MediaContentDescription::new(media_type);
    content.codecs.push(Codec::new(100, "codec", 90000, 1, 0));
    content
}

#[test]
fn test_channel_manager_create_and_terminate() -> Result<()> {
    let f = fixture(SettingEngine::default())?;
    let audio = FakeMediaChannel::new(MediaType::Audio);
    let video = FakeMediaChannel::new(MediaType::Video);
    let data = FakeMediaChannel::new(MediaType::Data);

    let voice_channel =
        f.manager
            .create_voice_channel(f.caller.session(), "audio", true, audio.clone())?;
    f.manager
        .create_video_channel(f.caller.session(), "video", true, video.clone())?;
    f.manager
        .create_data_channel(f.caller.session(), "data", false, data.clone())?;

    assert!(f.manager.has_channels());
    assert_eq!(voice_channel.content_name(), "audio");
    assert_eq!(voice_channel.media_type(), MediaType::Audio);
    assert!(f.caller.factory().channel("video", 2).is_some());
    assert!(f.caller.factory().channel("data", 1).is_some());
    assert!(f.caller.factory().channel("data", 2).is_none());

    let wrong = FakeMediaChannel::new(MediaType::Video);
    assert!(matches!(
        f.manager
            .create_voice_channel(f.caller.session(), "audio2", true, wrong),
        Err(Error::ErrUnsupportedMediaKind)
    ));

    f.manager.destroy_voice_channel(&voice_channel);
    assert!(f.manager.voice_channels().is_empty());
    assert!(!audio.has_interface());
    assert!(f.caller.factory().channel("audio", 1).is_none());

    f.manager.terminate();
    assert!(!f.manager.has_channels());
    assert!(!video.has_interface());
    assert!(!data.has_interface());
    assert!(f.caller.factory().channel("video", 1).is_none());
    assert!(f.caller.factory().channel("data", 1).is_none());
    Ok(())
}

#[test]
fn test_voice_channel_dtmf_and_ringback() -> Result<()> {
    let f = fixture(SettingEngine::default())?;
    let audio = FakeMediaChannel::new(MediaType::Audio);
    let voice = f
        .manager
        .create_voice_channel(f.caller.session(), "audio", true, audio.clone())?;
    f.manager.create_voice_channel(
        f.callee.session(),
        "audio",
        true,
        FakeMediaChannel::new(MediaType::Audio),
    )?;

    assert_eq!(
        voice.press_dtmf(1, true),
        Err(Error::ErrTransportNotWritable)
    );

    f.caller.connect(&f.callee);
    assert!(wait_until(|| voice.writable()));
    voice.enable(true)?;
    voice.press_dtmf(5, false)?;
    assert_eq!(audio.with_state(|s| s.dtmf.clone()), vec![(5, false)]);

    voice.set_ringback_tone(b"tone")?;
    voice.play_ringback_tone(7, true, false)?;
    voice.set_output_scaling(7, 0.5, 1.0)?;
    audio.with_state(|s| {
        assert_eq!(s.ringback_tone.as_deref(), Some(&b"tone"[..]));
        assert_eq!(s.ringback_playing, Some((7, true, false)));
        assert_eq!(s.output_scaling.get(&7), Some(&(0.5, 1.0)));
    });

    voice.mute(true)?;
    assert!(voice.muted());
    assert!(audio.with_state(|s| s.muted));
    Ok(())
}

#[test]
fn test_voice_channel_remote_options() -> Result<()> {
    let f = fixture(SettingEngine::default())?;
    let audio = FakeMediaChannel::new(MediaType::Audio);
    let voice = f
        .manager
        .create_voice_channel(f.caller.session(), "audio", true, audio.clone())?;

    let mut offer = content(MediaType::Audio);
    offer.conference_mode = true;
    offer.agc_minus_10db = true;
    voice.set_remote_content(&offer, ContentAction::Offer)?;
    assert_eq!(
        audio.with_state(|s| s.options),
        crate::media::OPT_CONFERENCE | crate::media::OPT_AGC_MINUS_10DB
    );
    Ok(())
}

#[test]
fn test_voice_channel_early_media_timeout() -> Result<()> {
    let mut setting_engine = SettingEngine::default();
    setting_engine.set_early_media_timeout(Duration::from_millis(50));
    let f = fixture(setting_engine)?;
    let voice = f.manager.create_voice_channel(
        f.caller.session(),
        "audio",
        true,
        FakeMediaChannel::new(MediaType::Audio),
    )?;

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    voice
        .signals()
        .early_media_timeout
        .connect(move |_: &()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    voice.set_early_media(true);
    assert!(wait_until(|| fired.load(Ordering::SeqCst) == 1));

    // disarmed timers never fire
    voice.set_early_media(true);
    voice.set_early_media(false);
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!voice.received_media());
    Ok(())
}

#[test]
fn test_voice_channel_media_cancels_early_media_timeout() -> Result<()> {
    let mut setting_engine = SettingEngine::default();
    setting_engine.set_early_media_timeout(Duration::from_millis(300));
    let f = fixture(setting_engine)?;
    let voice = f.manager.create_voice_channel(
        f.caller.session(),
        "audio",
        true,
        FakeMediaChannel::new(MediaType::Audio),
    )?;
    f.manager.create_voice_channel(
        f.callee.session(),
        "audio",
        true,
        FakeMediaChannel::new(MediaType::Audio),
    )?;
    f.caller.connect(&f.callee);
    assert!(wait_until(|| voice.writable()));

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    voice
        .signals()
        .early_media_timeout
        .connect(move |_: &()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    voice.set_early_media(true);

    let Some(raw) = f.callee.factory().channel("audio", 1) else {
        panic!("expected a raw transport");
    };
    let mut packet = vec![0x80, 0x00, 0x00, 0x01];
    packet.extend_from_slice(&[0u8; 8]);
    crate::transport::TransportChannel::send_packet(raw.as_ref(), &packet, 0)?;
    assert!(wait_until(|| voice.received_media()));

    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_video_channel_screencast_lifecycle() -> Result<()> {
    let f = fixture(SettingEngine::default())?;
    let media = FakeMediaChannel::new(MediaType::Video);
    let video = f
        .manager
        .create_video_channel(f.caller.session(), "video", true, media.clone())?;

    // no factory installed
    assert_eq!(
        video.add_screencast(100, ScreencastId::Window(1), 15),
        Err(Error::ErrMediaChannelFailed)
    );

    let factory = FakeScreenCapturerFactory::new();
    video.set_screen_capturer_factory(Some(
        Arc::clone(&factory) as Arc<dyn ScreenCapturerFactory>
    ));

    let events: Arc<Mutex<Vec<(u32, WindowEvent)>>> = Arc::new(Mutex::new(vec![]));
    let sink = Arc::clone(&events);
    video
        .signals()
        .screencast_window_event
        .connect(move |event: &(u32, WindowEvent)| {
            lock(&sink).push(*event);
        });

    let id = ScreencastId::Window(1);
    video.add_screencast(100, id, 15)?;
    assert!(video.is_screencasting());
    assert_eq!(video.screencast_fps(100), Some(15));
    assert!(media.with_state(|s| s.capturers.contains_key(&100)));
    assert_eq!(
        video.add_screencast(100, id, 15),
        Err(Error::ErrSsrcAlreadyExists(100))
    );

    let Some(capturer) = factory.capturer(&id) else {
        panic!("expected a capturer");
    };
    assert!(capturer.is_running());
    capturer.fire(CaptureEvent::Started);
    capturer.fire(CaptureEvent::Paused);
    assert!(wait_until(|| lock(&events).len() == 1));
    assert_eq!(lock(&events)[0], (100, WindowEvent::Minimize));

    video.remove_screencast(100)?;
    assert!(!video.is_screencasting());
    assert!(!capturer.is_running());
    assert_eq!(capturer.listeners(), 0);
    assert!(!media.with_state(|s| s.capturers.contains_key(&100)));
    assert_eq!(
        video.remove_screencast(100),
        Err(Error::ErrSsrcNotFound(100))
    );

    // teardown stops screencasts still running
    video.add_screencast(200, ScreencastId::Desktop(0), 5)?;
    f.manager.terminate();
    let desktop = factory.capturer(&ScreencastId::Desktop(0));
    assert_eq!(desktop.map(|c| c.is_running()), Some(false));
    Ok(())
}

#[test]
fn test_video_channel_view_request_and_bandwidth() -> Result<()> {
    let f = fixture(SettingEngine::default())?;
    let media = FakeMediaChannel::new(MediaType::Video);
    let video = f
        .manager
        .create_video_channel(f.caller.session(), "video", true, media.clone())?;

    let mut local = content(MediaType::Video);
    local.add_stream(StreamParams::new("me", "cam", vec![10]));
    local.add_stream(StreamParams::new("me", "screen", vec![20]));
    video.set_local_content(&local, ContentAction::Offer)?;

    let request = ViewRequest {
        static_video_views: vec![StaticVideoView {
            ssrc: 10,
            width: 640,
            height: 480,
            framerate: 30,
            preference: 0,
        }],
    };
    video.apply_view_request(&request)?;
    media.with_state(|s| {
        let cam = s.send_formats.get(&10).copied().unwrap_or_default();
        assert_eq!((cam.width, cam.height, cam.framerate()), (640, 480, 30));
        let screen = s.send_formats.get(&20).copied().unwrap_or_default();
        assert_eq!((screen.width, screen.height), (0, 0));
    });

    let everyone = ViewRequest {
        static_video_views: vec![StaticVideoView {
            ssrc: 0,
            width: 320,
            height: 240,
            framerate: 15,
            preference: 0,
        }],
    };
    video.apply_view_request(&everyone)?;
    media.with_state(|s| {
        assert_eq!(s.send_formats.get(&20).map(|f| f.width), Some(320));
        assert_eq!(s.send_formats.get(&10).map(|f| f.width), Some(320));
    });

    let mut remote = content(MediaType::Video);
    remote.bandwidth = 500_000;
    video.set_remote_content(&remote, ContentAction::Answer)?;
    assert_eq!(media.with_state(|s| s.send_bandwidth), Some((false, 500_000)));

    video.set_max_send_bandwidth(256_000)?;
    assert_eq!(media.with_state(|s| s.send_bandwidth), Some((true, 256_000)));

    video.send_intra_frame()?;
    video.request_intra_frame()?;
    media.with_state(|s| {
        assert_eq!(s.sent_intra_frames, 1);
        assert_eq!(s.requested_intra_frames, 1);
    });
    Ok(())
}

#[test]
fn test_data_channel_send_and_receive() -> Result<()> {
    let f = fixture(SettingEngine::default())?;
    let media = FakeMediaChannel::new(MediaType::Data);
    let data = f
        .manager
        .create_data_channel(f.caller.session(), "data", true, media.clone())?;

    // a remote description without codecs leaves the channel alone
    let empty = MediaContentDescription::new(MediaType::Data);
    data.set_remote_content(&empty, ContentAction::Offer)?;
    assert_eq!(data.remote_direction(), crate::media::MediaContentDirection::Inactive);
    data.set_remote_content(&content(MediaType::Data), ContentAction::Offer)?;
    assert_eq!(media.with_state(|s| s.send_codecs.len()), 1);

    let params = SendDataParams {
        ssrc: 3,
        ..Default::default()
    };
    data.send_data(&params, b"hello")?;
    assert_eq!(
        media.with_state(|s| s.sent_data.clone()),
        vec![(params, b"hello".to_vec())]
    );

    let received: Arc<Mutex<Vec<ReceivedData>>> = Arc::new(Mutex::new(vec![]));
    let sink = Arc::clone(&received);
    data.signals()
        .data_received
        .connect(move |message: &ReceivedData| {
            lock(&sink).push(message.clone());
        });
    let message = ReceivedData {
        params: ReceiveDataParams {
            ssrc: 9,
            ..Default::default()
        },
        payload: b"world".to_vec(),
    };
    media.inject_data(message.clone());
    assert!(wait_until(|| lock(&received).len() == 1));
    assert_eq!(lock(&received)[0], message);

    let errors = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&errors);
    data.signals()
        .media_error
        .connect(move |_: &MediaChannelError| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    media.raise_error(MediaChannelError::default());
    assert!(wait_until(|| errors.load(Ordering::SeqCst) == 1));
    Ok(())
}
