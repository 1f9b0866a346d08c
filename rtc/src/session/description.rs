use serde::{Deserialize, Serialize};

use crate::media::MediaType;
use crate::media::content_description::MediaContentDescription;

/// One named content ("audio", "video", ...) of a session description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentInfo {
    pub name: String,
    pub rejected: bool,
    pub description: MediaContentDescription,
}

impl ContentInfo {
    pub fn new(name: &str, description: MediaContentDescription) -> Self {
        ContentInfo {
            name: name.to_owned(),
            rejected: false,
            description,
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub contents: Vec<ContentInfo>,
}

impl SessionDescription {
    pub fn add_content(&mut self, name: &str, description: MediaContentDescription) {
        self.contents.push(ContentInfo::new(name, description));
    }

    pub fn get_content_by_name(&self, name: &str) -> Option<&ContentInfo> {
        self.contents.iter().find(|c| c.name == name)
    }

    pub fn get_content_description(&self, name: &str) -> Option<&MediaContentDescription> {
        self.get_content_by_name(name).map(|c| &c.description)
    }

    pub fn first_content_by_type(&self, media_type: MediaType) -> Option<&ContentInfo> {
        self.contents
            .iter()
            .find(|c| c.description.media_type == media_type)
    }

    pub fn first_audio_content(&self) -> Option<&ContentInfo> {
        self.first_content_by_type(MediaType::Audio)
    }

    pub fn first_video_content(&self) -> Option<&ContentInfo> {
        self.first_content_by_type(MediaType::Video)
    }

    pub fn first_data_content(&self) -> Option<&ContentInfo> {
        self.first_content_by_type(MediaType::Data)
    }
}
