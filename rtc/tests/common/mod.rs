#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use base::{MessageQueueManager, Thread};
use shared::ContentAction;

use rtc::channel::BaseChannel;
use rtc::media::MediaType;
use rtc::media::codec::Codec;
use rtc::media::content_description::MediaContentDescription;

pub fn init_log() {
    env_logger::builder().is_test(true).try_init().ok();
}

/// Signaling and worker threads sharing one queue manager.
pub fn threads() -> Result<(Thread, Thread)> {
    let manager = MessageQueueManager::new();
    let signaling = Thread::spawn("signaling", Arc::clone(&manager))?;
    let worker = Thread::spawn("worker", manager)?;
    Ok((signaling, worker))
}

pub fn wait_until(f: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    f()
}

pub fn rtp_packet(seq: u16, ssrc: u32, payload_len: usize) -> Vec<u8> {
    let mut packet = vec![0x80, 0x00];
    packet.extend_from_slice(&seq.to_be_bytes());
    packet.extend_from_slice(&(u32::from(seq) * 160).to_be_bytes());
    packet.extend_from_slice(&ssrc.to_be_bytes());
    packet.extend(std::iter::repeat_n(0x5a, payload_len));
    packet
}

pub fn rtcp_receiver_report(ssrc: u32) -> Vec<u8> {
    let mut packet = vec![0x80, 201, 0x00, 0x01];
    packet.extend_from_slice(&ssrc.to_be_bytes());
    packet
}

pub fn audio_content() -> MediaContentDescription {
    let mut content = MediaContentDescription::new(MediaType::Audio);
    content.codecs.push(Codec::new(0, "PCMU", 8000, 1, 0));
    content
}

/// Runs one offer/answer exchange between two channels.
pub fn negotiate(
    offerer: &BaseChannel,
    answerer: &BaseChannel,
    offer: &MediaContentDescription,
    answer: &MediaContentDescription,
) -> Result<()> {
    offerer.set_local_content(offer, ContentAction::Offer)?;
    answerer.set_remote_content(offer, ContentAction::Offer)?;
    answerer.set_local_content(answer, ContentAction::Answer)?;
    offerer.set_remote_content(answer, ContentAction::Answer)?;
    Ok(())
}
