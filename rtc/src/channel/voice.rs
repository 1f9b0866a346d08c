use std::ops::Deref;
use std::sync::Arc;

use log::{info, warn};

use base::message::MessageHandler;
use shared::ContentAction;
use shared::error::{Error, Result};
use srtp::{SrtpErrorKind, SrtpMode};

use crate::channel::base::{
    BaseChannel, ChannelMessage, MSG_EARLYMEDIATIMEOUT, MediaKind, merge,
};
use crate::media::content_description::MediaContentDescription;
use crate::media::{MediaError, OPT_AGC_MINUS_10DB, OPT_CONFERENCE};

/// An audio channel.
#[derive(Debug)]
pub struct VoiceChannel {
    base: Arc<BaseChannel>,
}

impl Deref for VoiceChannel {
    type Target = BaseChannel;

    fn deref(&self) -> &BaseChannel {
        &self.base
    }
}

impl VoiceChannel {
    pub(crate) fn new(base: Arc<BaseChannel>) -> Self {
        VoiceChannel { base }
    }

    pub fn base(&self) -> &Arc<BaseChannel> {
        &self.base
    }

    pub fn set_ringback_tone(&self, tone: &[u8]) -> Result<()> {
        let tone = tone.to_vec();
        self.base
            .invoke(move |this| this.media_channel().set_ringback_tone(&tone))
    }

    pub fn play_ringback_tone(&self, ssrc: u32, play: bool, looping: bool) -> Result<()> {
        self.base.invoke(move |this| {
            this.media_channel().play_ringback_tone(ssrc, play, looping)
        })
    }

    /// Sends a DTMF digit, optionally playing it out locally too.
    pub fn press_dtmf(&self, digit: i32, playout: bool) -> Result<()> {
        self.base.invoke(move |this| {
            {
                let state = this.state();
                if !state.enabled || !state.writable {
                    return Err(Error::ErrTransportNotWritable);
                }
            }
            this.media_channel().press_dtmf(digit, playout)
        })
    }

    pub fn set_output_scaling(&self, ssrc: u32, left: f64, right: f64) -> Result<()> {
        self.base.invoke(move |this| {
            this.media_channel().set_output_scaling(ssrc, left, right)
        })
    }

    /// Whether any RTP has arrived on this channel.
    pub fn received_media(&self) -> bool {
        matches!(
            self.base.state().kind,
            MediaKind::Voice {
                received_media: true
            }
        )
    }

    /// Arms (or disarms) the early media timer on the signaling thread.
    /// When it fires before any RTP arrived, `early_media_timeout` is
    /// signaled.
    pub fn set_early_media(&self, enable: bool) {
        let signaling = self.base.signaling_thread();
        if enable {
            let timeout = self.base.setting_engine().early_media_timeout();
            signaling.queue().post_delayed(
                timeout,
                &self.base,
                MSG_EARLYMEDIATIMEOUT,
                ChannelMessage::EarlyMediaTimeout,
            );
        } else {
            signaling
                .queue()
                .clear(self.base.handler_id(), MSG_EARLYMEDIATIMEOUT);
        }
    }
}

pub(super) fn handle_early_media_timeout(base: &BaseChannel) {
    let received = matches!(
        base.state().kind,
        MediaKind::Voice {
            received_media: true
        }
    );
    if !received {
        info!("no early media received before timeout");
        base.signals().early_media_timeout.emit(&());
    }
}

pub(super) fn teardown(base: &BaseChannel) {
    base.signaling_thread()
        .queue()
        .clear(base.handler_id(), MSG_EARLYMEDIATIMEOUT);
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
        if content.agc_minus_10db {
            options |= OPT_AGC_MINUS_10DB;
        }
        if let Err(err) = base.media_channel().set_options(options) {
            // Not fatal for the description.
            warn!("failed to set voice channel options: {}", err);
        }
    }
    result
}

pub(super) fn srtp_media_error(mode: SrtpMode, error: SrtpErrorKind) -> Option<MediaError> {
    match (mode, error) {
        (SrtpMode::Protect, SrtpErrorKind::Fail) => Some(MediaError::RecSrtpError),
        (SrtpMode::Protect, SrtpErrorKind::Auth) => Some(MediaError::RecSrtpAuthFailed),
        (SrtpMode::Protect, SrtpErrorKind::Replay) => None,
        (SrtpMode::Unprotect, SrtpErrorKind::Fail) => Some(MediaError::PlaySrtpError),
        (SrtpMode::Unprotect, SrtpErrorKind::Auth) => Some(MediaError::PlaySrtpAuthFailed),
        (SrtpMode::Unprotect, SrtpErrorKind::Replay) => Some(MediaError::PlaySrtpReplay),
    }
}
