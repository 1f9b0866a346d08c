use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A payload format as listed in a content description.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codec {
    pub id: u8,
    pub name: String,
    pub clockrate: u32,
    pub channels: u16,
    pub preference: i32,
    pub params: HashMap<String, String>,
}

impl Codec {
    pub fn new(id: u8, name: &str, clockrate: u32, channels: u16, preference: i32) -> Self {
        Codec {
            id,
            name: name.to_owned(),
            clockrate,
            channels,
            preference,
            params: HashMap::new(),
        }
    }

    /// Static payload types (below 96) match by id, dynamic ones by name
    /// and clock rate.
    pub fn matches(&self, other: &Codec) -> bool {
        if self.id < 96 && other.id < 96 {
            self.id == other.id
        } else {
            self.name.eq_ignore_ascii_case(&other.name) && self.clockrate == other.clockrate
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.id, self.name, self.clockrate)?;
        if self.channels > 1 {
            write!(f, "/{}", self.channels)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_codec_matches() {
        let pcmu = Codec::new(0, "PCMU", 8000, 1, 0);
        let pcmu_renamed = Codec::new(0, "pcmu-x", 8000, 1, 0);
        let opus = Codec::new(111, "opus", 48000, 2, 0);
        let opus_other_pt = Codec::new(120, "OPUS", 48000, 2, 0);

        assert!(pcmu.matches(&pcmu_renamed));
        assert!(opus.matches(&opus_other_pt));
        assert!(!opus.matches(&pcmu));
        assert_eq!(opus.to_string(), "111:opus/48000/2");
        assert_eq!(pcmu.to_string(), "0:PCMU/8000");
    }
}
