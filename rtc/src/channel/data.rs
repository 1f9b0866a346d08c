use std::ops::Deref;
use std::sync::Arc;

use log::debug;

use shared::ContentAction;
use shared::error::Result;
use srtp::{SrtpErrorKind, SrtpMode};

use crate::channel::base::{BaseChannel, merge};
use crate::media::MediaError;
use crate::media::content_description::{AUTO_BANDWIDTH, MediaContentDescription};
use crate::media::data::SendDataParams;

/// A channel carrying application data messages over RTP.
#[derive(Debug)]
pub struct DataChannel {
    base: Arc<BaseChannel>,
}

impl Deref for DataChannel {
    type Target = BaseChannel;

    fn deref(&self) -> &BaseChannel {
        &self.base
    }
}

impl DataChannel {
    pub(crate) fn new(base: Arc<BaseChannel>) -> Self {
        DataChannel { base }
    }

    pub fn base(&self) -> &Arc<BaseChannel> {
        &self.base
    }

    pub fn send_data(&self, params: &SendDataParams, payload: &[u8]) -> Result<()> {
        let params = params.clone();
        let payload = payload.to_vec();
        self.base
            .invoke(move |this| this.media_channel().send_data(&params, &payload))
    }
}

pub(super) fn set_remote_content(
    base: &BaseChannel,
    content: &MediaContentDescription,
    action: ContentAction,
) -> Result<()> {
    if action != ContentAction::Update && !content.has_codecs() {
        // Nothing to send with yet.
        debug!("remote data content without codecs ignored");
        return Ok(());
    }

    let mut result = Ok(());
    if action != ContentAction::Update || content.has_codecs() {
        merge(
            &mut result,
            base.media_channel().set_send_codecs(&content.codecs),
        );
    }
    if result.is_ok() {
        result = base.set_base_remote_content_w(content, action);
    }
    if action != ContentAction::Update {
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
        (SrtpMode::Protect, SrtpErrorKind::Fail) => Some(MediaError::SendSrtpError),
        (SrtpMode::Protect, SrtpErrorKind::Auth) => Some(MediaError::SendSrtpAuthFailed),
        (SrtpMode::Protect, SrtpErrorKind::Replay) => None,
        (SrtpMode::Unprotect, SrtpErrorKind::Fail) => Some(MediaError::RecvSrtpError),
        (SrtpMode::Unprotect, SrtpErrorKind::Auth) => Some(MediaError::RecvSrtpAuthFailed),
        (SrtpMode::Unprotect, SrtpErrorKind::Replay) => Some(MediaError::RecvSrtpReplay),
    }
}
