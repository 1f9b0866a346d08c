use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use log::{debug, info, warn};

use base::SlotId;
use shared::ContentAction;
use shared::error::{Error, Result};
use srtp::{SrtpErrorKind, SrtpMode};

use crate::channel::base::{
    BaseChannel, ChannelMessage, MSG_SCREENCASTWINDOWEVENT, MediaKind, merge,
};
use crate::media::content_description::{AUTO_BANDWIDTH, MediaContentDescription};
use crate::media::video::{
    CaptureEvent, FOURCC_I420, NullScreenCapturerFactory, ScreenCapturerFactory, ScreencastId,
    VideoCapturer, VideoFormat, VideoRenderer, ViewRequest, WindowEvent,
};
use crate::media::{MediaError, OPT_CONFERENCE};

/// A screen capturer feeding one send SSRC.
pub(crate) struct Screencast {
    pub(crate) capturer: Arc<dyn VideoCapturer>,
    slot: SlotId,
}

/// A video channel.
#[derive(Debug)]
pub struct VideoChannel {
    base: Arc<BaseChannel>,
}

impl Deref for VideoChannel {
    type Target = BaseChannel;

    fn deref(&self) -> &BaseChannel {
        &self.base
    }
}

impl VideoChannel {
    pub(crate) fn new(base: Arc<BaseChannel>) -> Self {
        VideoChannel { base }
    }

    pub fn base(&self) -> &Arc<BaseChannel> {
        &self.base
    }

    pub fn set_renderer(&self, ssrc: u32, renderer: Option<Arc<dyn VideoRenderer>>) -> Result<()> {
        self.base
            .invoke(move |this| this.media_channel().set_renderer(ssrc, renderer))
    }

    /// Applies the remote side's view request to the local send streams.
    /// A view with SSRC 0 matches every stream; streams without a view are
    /// set to a 0x0 format, which stops them.
    pub fn apply_view_request(&self, request: &ViewRequest) -> Result<()> {
        let request = request.clone();
        self.base
            .invoke(move |this| apply_view_request_w(this, &request))
    }

    pub fn add_screencast(&self, ssrc: u32, id: ScreencastId, fps: u32) -> Result<()> {
        self.base
            .invoke(move |this| add_screencast_w(this, ssrc, id, fps))
    }

    pub fn remove_screencast(&self, ssrc: u32) -> Result<()> {
        self.base
            .invoke(move |this| remove_screencast_w(this, ssrc))
    }

    pub fn set_capturer(&self, ssrc: u32, capturer: Option<Arc<dyn VideoCapturer>>) -> Result<()> {
        self.base
            .invoke(move |this| this.media_channel().set_capturer(ssrc, capturer))
    }

    pub fn is_screencasting(&self) -> bool {
        match &self.base.state().kind {
            MediaKind::Video { screencasts, .. } => !screencasts.is_empty(),
            _ => false,
        }
    }

    /// Frame rate the screencast on `ssrc` captures at.
    pub fn screencast_fps(&self, ssrc: u32) -> Option<u32> {
        let capturer = match &self.base.state().kind {
            MediaKind::Video { screencasts, .. } => {
                screencasts.get(&ssrc).map(|sc| Arc::clone(&sc.capturer))
            }
            _ => None,
        }?;
        capturer.capture_format().map(|format| format.framerate())
    }

    /// Replaces the factory screen capturers are created with. `None`
    /// installs one that never creates a capturer.
    pub fn set_screen_capturer_factory(&self, factory: Option<Arc<dyn ScreenCapturerFactory>>) {
        let factory = factory.unwrap_or_else(|| Arc::new(NullScreenCapturerFactory));
        if let MediaKind::Video { factory: current, .. } = &mut self.base.state().kind {
            *current = factory;
        }
    }

    pub fn send_intra_frame(&self) -> Result<()> {
        self.base
            .invoke(|this| this.media_channel().send_intra_frame())
    }

    pub fn request_intra_frame(&self) -> Result<()> {
        self.base
            .invoke(|this| this.media_channel().request_intra_frame())
    }
}

fn apply_view_request_w(base: &BaseChannel, request: &ViewRequest) -> Result<()> {
    for view in &request.static_video_views {
        if view.ssrc != 0
            && !base
                .state()
                .local_streams
                .iter()
                .any(|sp| sp.has_ssrc(view.ssrc))
        {
            warn!("view request for unknown ssrc {}", view.ssrc);
        }
    }

    let mut result = Ok(());
    for stream in base.local_streams() {
        let mut format = VideoFormat::new(0, 0, VideoFormat::fps_to_interval(0), FOURCC_I420);
        if let Some(view) = request
            .static_video_views
            .iter()
            .find(|view| stream.has_ssrc(view.ssrc) || view.ssrc == 0)
        {
            format.width = view.width;
            format.height = view.height;
            format.interval = VideoFormat::fps_to_interval(view.framerate);
        }
        debug!("send stream {} format {}", stream.first_ssrc(), format);
        merge(
            &mut result,
            base.media_channel()
                .set_send_stream_format(stream.first_ssrc(), &format),
        );
    }
    result
}

fn add_screencast_w(base: &BaseChannel, ssrc: u32, id: ScreencastId, fps: u32) -> Result<()> {
    let factory = match &base.state().kind {
        MediaKind::Video {
            screencasts,
            factory,
        } => {
            if screencasts.contains_key(&ssrc) {
                return Err(Error::ErrSsrcAlreadyExists(ssrc));
            }
            Arc::clone(factory)
        }
        _ => return Err(Error::ErrUnsupportedMediaKind),
    };
    let Some(capturer) = factory.create_screen_capturer(&id) else {
        warn!("unable to create screen capturer for {:?}", id);
        return Err(Error::ErrMediaChannelFailed);
    };

    let weak = base.weak();
    let slot = capturer.on_capture_event(Box::new(move |event: &CaptureEvent| {
        let Some(event) = WindowEvent::from_capture_event(*event) else {
            return;
        };
        if let Some(this) = weak.upgrade() {
            this.post_to_signaling(
                MSG_SCREENCASTWINDOWEVENT,
                ChannelMessage::ScreencastWindowEvent(ssrc, event),
            );
        }
    }));

    let format = VideoFormat::new(0, 0, VideoFormat::fps_to_interval(fps), FOURCC_I420);
    if let Err(err) = capturer.start(&format) {
        capturer.disconnect(slot);
        return Err(err);
    }
    if let Err(err) = base
        .media_channel()
        .set_capturer(ssrc, Some(Arc::clone(&capturer)))
    {
        capturer.disconnect(slot);
        capturer.stop();
        return Err(err);
    }

    info!("screencast {:?} started on ssrc {} at {} fps", id, ssrc, fps);
    if let MediaKind::Video { screencasts, .. } = &mut base.state().kind {
        screencasts.insert(ssrc, Screencast { capturer, slot });
    }
    Ok(())
}

fn remove_screencast_w(base: &BaseChannel, ssrc: u32) -> Result<()> {
    let screencast = match &mut base.state().kind {
        MediaKind::Video { screencasts, .. } => screencasts.remove(&ssrc),
        _ => None,
    };
    let Some(screencast) = screencast else {
        return Err(Error::ErrSsrcNotFound(ssrc));
    };
    stop_screencast(base, ssrc, screencast);
    Ok(())
}

fn stop_screencast(base: &BaseChannel, ssrc: u32, screencast: Screencast) {
    if let Err(err) = base.media_channel().set_capturer(ssrc, None) {
        warn!("failed to detach capturer from ssrc {}: {}", ssrc, err);
    }
    screencast.capturer.disconnect(screencast.slot);
    screencast.capturer.stop();
}

pub(super) fn teardown(base: &BaseChannel) {
    let screencasts = match &mut base.state().kind {
        MediaKind::Video { screencasts, .. } => std::mem::take(screencasts),
        _ => HashMap::new(),
    };
    for (ssrc, screencast) in screencasts {
        stop_screencast(base, ssrc, screencast);
    }
}

pub(super) fn set_remote_content(
    base: &BaseChannel,
    content: &MediaContentDescription,
    action: ContentAction,
) -> Result<()> {
    let mut result = Ok(());
    if action != ContentAction::Update || content.has_codecs() {
        merge(
            &mut result,
            base.media_channel().set_send_codecs(&content.codecs),
        );
    }
    merge(&mut result, base.set_base_remote_content_w(content, action));

    if action != ContentAction::Update {
        let mut options = base.media_channel().options();
        if content.conference_mode {
            options |= OPT_CONFERENCE;
        }
        if let Err(err) = base.media_channel().set_options(options) {
            warn!("failed to set video channel options: {}", err);
        }
        merge(
            &mut result,
            base.media_channel().set_send_bandwidth(
                content.bandwidth == AUTO_BANDWIDTH,
                content.bandwidth,
            ),
        );
    }
    result
}

pub(super) fn srtp_media_error(mode: SrtpMode, error: SrtpErrorKind) -> Option<MediaError> {
    match (mode, error) {
        (SrtpMode::Protect, SrtpErrorKind::Fail) => Some(MediaError::RecSrtpError),
        (SrtpMode::Protect, SrtpErrorKind::Auth) => Some(MediaError::RecSrtpAuthFailed),
        (SrtpMode::Unprotect, SrtpErrorKind::Fail) => Some(MediaError::PlaySrtpError),
        (SrtpMode::Unprotect, SrtpErrorKind::Auth) => Some(MediaError::PlaySrtpAuthFailed),
        // Replays are dropped silently for video.
        (_, SrtpErrorKind::Replay) => None,
    }
}
