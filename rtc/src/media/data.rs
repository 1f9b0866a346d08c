use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataMessageType {
    #[default]
    Text,
    Binary,
    Control,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendDataParams {
    pub ssrc: u32,
    pub message_type: DataMessageType,
    pub ordered: bool,
    pub reliable: bool,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveDataParams {
    pub ssrc: u32,
    pub message_type: DataMessageType,
    pub seq_num: u32,
    pub timestamp: u32,
}

/// A data message delivered by a data media channel.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedData {
    pub params: ReceiveDataParams,
    pub payload: Vec<u8>,
}
