#[cfg(test)]
mod channel_manager_test;

use std::sync::{Arc, Mutex};

use log::{info, warn};

use base::Thread;
use base::message::{HandlerId, next_handler_id};
use base::sync::lock;
use shared::error::{Error, Result};

use crate::channel::{BaseChannel, DataChannel, VideoChannel, VoiceChannel};
use crate::configuration::setting_engine::SettingEngine;
use crate::media::{MediaChannel, MediaType};
use crate::session::Session;

#[derive(Default)]
struct Channels {
    voice: Vec<Arc<VoiceChannel>>,
    video: Vec<Arc<VideoChannel>>,
    data: Vec<Arc<DataChannel>>,
}

/// Creates, owns and destroys the channels of one worker thread.
///
/// Channels are built and torn down on the worker thread; the calling
/// thread blocks until that is done.
pub struct ChannelManager {
    id: HandlerId,
    worker: Thread,
    signaling: Thread,
    setting_engine: SettingEngine,
    channels: Mutex<Channels>,
}

impl ChannelManager {
    pub fn new(worker: Thread, signaling: Thread, setting_engine: SettingEngine) -> Self {
        ChannelManager {
            id: next_handler_id(),
            worker,
            signaling,
            setting_engine,
            channels: Mutex::new(Channels::default()),
        }
    }

    pub fn worker_thread(&self) -> &Thread {
        &self.worker
    }

    pub fn signaling_thread(&self) -> &Thread {
        &self.signaling
    }

    pub fn setting_engine(&self) -> &SettingEngine {
        &self.setting_engine
    }

    pub fn create_voice_channel(
        &self,
        session: &Arc<Session>,
        content_name: &str,
        rtcp: bool,
        media_channel: Arc<dyn MediaChannel>,
    ) -> Result<Arc<VoiceChannel>> {
        let base = self.create_base_channel(
            session,
            content_name,
            rtcp,
            media_channel,
            MediaType::Audio,
        )?;
        let channel = Arc::new(VoiceChannel::new(base));
        lock(&self.channels).voice.push(Arc::clone(&channel));
        Ok(channel)
    }

    pub fn create_video_channel(
        &self,
        session: &Arc<Session>,
        content_name: &str,
        rtcp: bool,
        media_channel: Arc<dyn MediaChannel>,
    ) -> Result<Arc<VideoChannel>> {
        let base = self.create_base_channel(
            session,
            content_name,
            rtcp,
            media_channel,
            MediaType::Video,
        )?;
        let channel = Arc::new(VideoChannel::new(base));
        lock(&self.channels).video.push(Arc::clone(&channel));
        Ok(channel)
    }

    pub fn create_data_channel(
        &self,
        session: &Arc<Session>,
        content_name: &str,
        rtcp: bool,
        media_channel: Arc<dyn MediaChannel>,
    ) -> Result<Arc<DataChannel>> {
        let base = self.create_base_channel(
            session,
            content_name,
            rtcp,
            media_channel,
            MediaType::Data,
        )?;
        let channel = Arc::new(DataChannel::new(base));
        lock(&self.channels).data.push(Arc::clone(&channel));
        Ok(channel)
    }

    fn create_base_channel(
        &self,
        session: &Arc<Session>,
        content_name: &str,
        rtcp: bool,
        media_channel: Arc<dyn MediaChannel>,
        media_type: MediaType,
    ) -> Result<Arc<BaseChannel>> {
        if media_channel.media_type() != media_type {
            return Err(Error::ErrUnsupportedMediaKind);
        }

        let worker = self.worker.clone();
        let session = Arc::clone(session);
        let content_name = content_name.to_owned();
        let setting_engine = self.setting_engine.clone();
        self.worker
            .send(self.id, move || {
                let channel = BaseChannel::new(
                    worker,
                    media_channel,
                    session,
                    &content_name,
                    rtcp,
                    setting_engine,
                );
                if let Err(err) = channel.init() {
                    warn!("failed to init {} channel {}: {}", media_type, content_name, err);
                    channel.destroy();
                    return Err(err);
                }
                Ok(channel)
            })
            .unwrap_or(Err(Error::ErrWorkerThreadGone))
    }

    pub fn destroy_voice_channel(&self, channel: &Arc<VoiceChannel>) {
        let removed = {
            let mut channels = lock(&self.channels);
            let before = channels.voice.len();
            channels.voice.retain(|c| !Arc::ptr_eq(c, channel));
            before != channels.voice.len()
        };
        if removed {
            self.destroy_base_channel(channel.base());
        } else {
            warn!("voice channel {} is not owned here", channel.content_name());
        }
    }

    pub fn destroy_video_channel(&self, channel: &Arc<VideoChannel>) {
        let removed = {
            let mut channels = lock(&self.channels);
            let before = channels.video.len();
            channels.video.retain(|c| !Arc::ptr_eq(c, channel));
            before != channels.video.len()
        };
        if removed {
            self.destroy_base_channel(channel.base());
        } else {
            warn!("video channel {} is not owned here", channel.content_name());
        }
    }

    pub fn destroy_data_channel(&self, channel: &Arc<DataChannel>) {
        let removed = {
            let mut channels = lock(&self.channels);
            let before = channels.data.len();
            channels.data.retain(|c| !Arc::ptr_eq(c, channel));
            before != channels.data.len()
        };
        if removed {
            self.destroy_base_channel(channel.base());
        } else {
            warn!("data channel {} is not owned here", channel.content_name());
        }
    }

    fn destroy_base_channel(&self, channel: &Arc<BaseChannel>) {
        let channel = Arc::clone(channel);
        if self.worker.send(self.id, move || channel.destroy()).is_none() {
            warn!("worker thread gone before channel teardown");
        }
    }

    pub fn voice_channels(&self) -> Vec<Arc<VoiceChannel>> {
        lock(&self.channels).voice.clone()
    }

    pub fn video_channels(&self) -> Vec<Arc<VideoChannel>> {
        lock(&self.channels).video.clone()
    }

    pub fn data_channels(&self) -> Vec<Arc<DataChannel>> {
        lock(&self.channels).data.clone()
    }

    pub fn has_channels(&self) -> bool {
        let channels = lock(&self.channels);
        !channels.voice.is_empty() || !channels.video.is_empty() || !channels.data.is_empty()
    }

    /// Destroys every channel.
    pub fn terminate(&self) {
        let channels = std::mem::take(&mut *lock(&self.channels));
        let count = channels.voice.len() + channels.video.len() + channels.data.len();
        if count == 0 {
            return;
        }
        for channel in &channels.voice {
            self.destroy_base_channel(channel.base());
        }
        for channel in &channels.video {
            self.destroy_base_channel(channel.base());
        }
        for channel in &channels.data {
            self.destroy_base_channel(channel.base());
        }
        info!("channel manager terminated {} channels", count);
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.terminate();
    }
}
