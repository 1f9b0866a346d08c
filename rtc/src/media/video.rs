//! Video formats, view requests and the capture/render seams.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use base::SlotId;
use shared::error::Result;

/// FOURCC of planar YUV 4:2:0.
pub const FOURCC_I420: u32 = u32::from_le_bytes(*b"I420");

const NANOS_PER_SEC: u64 = 1_000_000_000;
/// Frame interval used when no frame rate is given.
pub const MINIMUM_INTERVAL: Duration = Duration::from_micros(100);

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub interval: Duration,
    pub fourcc: u32,
}

impl VideoFormat {
    pub fn new(width: u32, height: u32, interval: Duration, fourcc: u32) -> Self {
        VideoFormat {
            width,
            height,
            interval,
            fourcc,
        }
    }

    pub fn fps_to_interval(fps: u32) -> Duration {
        if fps == 0 {
            MINIMUM_INTERVAL
        } else {
            Duration::from_nanos(NANOS_PER_SEC / u64::from(fps))
        }
    }

    pub fn interval_to_fps(interval: Duration) -> u32 {
        let nanos = interval.as_nanos();
        if nanos == 0 {
            0
        } else {
            (u128::from(NANOS_PER_SEC) / nanos) as u32
        }
    }

    pub fn framerate(&self) -> u32 {
        Self::interval_to_fps(self.interval)
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.framerate())
    }
}

/// The size and rate the remote side wants to receive one of our streams at.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticVideoView {
    pub ssrc: u32,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub preference: i32,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRequest {
    pub static_video_views: Vec<StaticVideoView>,
}

/// What a screencast captures.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScreencastId {
    Window(u64),
    Desktop(u64),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureEvent {
    Started,
    Stopped,
    Paused,
    Resumed,
}

/// Window level events reported for a screencast.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowEvent {
    Close,
    Minimize,
    Restore,
}

impl WindowEvent {
    /// The window event a capture event stands for, if any.
    pub fn from_capture_event(event: CaptureEvent) -> Option<Self> {
        match event {
            CaptureEvent::Stopped => Some(WindowEvent::Close),
            CaptureEvent::Paused => Some(WindowEvent::Minimize),
            CaptureEvent::Resumed => Some(WindowEvent::Restore),
            CaptureEvent::Started => None,
        }
    }
}

pub type CaptureEventFn = Box<dyn Fn(&CaptureEvent) + Send + Sync>;

pub trait VideoCapturer: Send + Sync {
    fn start(&self, format: &VideoFormat) -> Result<()>;
    fn stop(&self);
    fn is_running(&self) -> bool;
    /// The format capture was started with.
    fn capture_format(&self) -> Option<VideoFormat>;
    fn on_capture_event(&self, f: CaptureEventFn) -> SlotId;
    fn disconnect(&self, id: SlotId) -> bool;
}

pub trait ScreenCapturerFactory: Send + Sync {
    fn create_screen_capturer(&self, id: &ScreencastId) -> Option<Arc<dyn VideoCapturer>>;
}

/// Creates no capturers; screencasts fail until a real factory is set.
#[derive(Debug, Default)]
pub struct NullScreenCapturerFactory;

impl ScreenCapturerFactory for NullScreenCapturerFactory {
    fn create_screen_capturer(&self, _id: &ScreencastId) -> Option<Arc<dyn VideoCapturer>> {
        None
    }
}

pub trait VideoRenderer: Send + Sync {
    fn set_size(&self, width: u32, height: u32) -> bool;
    fn render_frame(&self, frame: &[u8]) -> bool;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_video_format_interval() {
        assert_eq!(VideoFormat::fps_to_interval(30), Duration::from_nanos(33_333_333));
        assert_eq!(VideoFormat::fps_to_interval(0), MINIMUM_INTERVAL);
        assert_eq!(VideoFormat::interval_to_fps(Duration::from_nanos(33_333_333)), 30);
        assert_eq!(VideoFormat::interval_to_fps(Duration::ZERO), 0);

        let format = VideoFormat::new(640, 480, VideoFormat::fps_to_interval(15), FOURCC_I420);
        assert_eq!(format.framerate(), 15);
        assert_eq!(format.to_string(), "640x480x15");
    }

    #[test]
    fn test_window_event_from_capture_event() {
        assert_eq!(
            WindowEvent::from_capture_event(CaptureEvent::Stopped),
            Some(WindowEvent::Close)
        );
        assert_eq!(
            WindowEvent::from_capture_event(CaptureEvent::Paused),
            Some(WindowEvent::Minimize)
        );
        assert_eq!(
            WindowEvent::from_capture_event(CaptureEvent::Resumed),
            Some(WindowEvent::Restore)
        );
        assert_eq!(WindowEvent::from_capture_event(CaptureEvent::Started), None);
    }
}
