//! HiSLIP wire message: the fixed 16-byte header plus payload (SPEC_FULL.md §4.4).
//!
//! No teacher module covers HiSLIP; the header codec follows the same "pack into a
//! `Vec<u8>`, parse by draining a buffer" shape as
//! `examples/farlepet-testeq-rs/src/protocol/vxi11/xdr.rs` since that is how this
//! codebase's wire codecs are written, even though HiSLIP's header is fixed-size
//! big-endian fields rather than XDR.

use crate::{
    error::{Error, Result},
    transport::Transport,
};

pub const PROLOGUE: [u8; 2] = *b"HS";
pub const HEADER_LEN: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Initialize = 0,
    InitializeResponse = 1,
    FatalError = 2,
    Error = 3,
    Data = 6,
    DataEnd = 7,
    DeviceClearComplete = 8,
    DeviceClearAcknowledge = 9,
    Trigger = 12,
    AsyncInitialize = 17,
    AsyncInitializeResponse = 18,
    AsyncDeviceClear = 19,
    AsyncServiceRequest = 20,
    AsyncStatusQuery = 21,
    AsyncStatusResponse = 22,
}
impl MessageType {
    fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            0 => Self::Initialize,
            1 => Self::InitializeResponse,
            2 => Self::FatalError,
            3 => Self::Error,
            6 => Self::Data,
            7 => Self::DataEnd,
            8 => Self::DeviceClearComplete,
            9 => Self::DeviceClearAcknowledge,
            12 => Self::Trigger,
            17 => Self::AsyncInitialize,
            18 => Self::AsyncInitializeResponse,
            19 => Self::AsyncDeviceClear,
            20 => Self::AsyncServiceRequest,
            21 => Self::AsyncStatusQuery,
            22 => Self::AsyncStatusResponse,
            other => return Err(Error::BadResponse(format!("unknown HiSLIP message type {other}"))),
        })
    }
}

/// One HiSLIP frame: header fields plus payload. `message_parameter`'s meaning
/// depends on `message_type` (e.g. negotiated protocol version on
/// `InitializeResponse`, message id on `Data`/`DataEnd`, status byte on
/// `AsyncServiceRequest`).
#[derive(Debug)]
pub struct Message {
    pub message_type: MessageType,
    pub control_code: u8,
    pub message_parameter: u32,
    pub payload: Vec<u8>,
}
impl Message {
    pub fn new(message_type: MessageType, control_code: u8, message_parameter: u32, payload: Vec<u8>) -> Self {
        Self {
            message_type,
            control_code,
            message_parameter,
            payload,
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend(PROLOGUE);
        out.push(self.message_type as u8);
        out.push(self.control_code);
        out.extend(self.message_parameter.to_be_bytes());
        out.extend((self.payload.len() as u64).to_be_bytes());
        out.extend(&self.payload);
        out
    }

    pub async fn write(&self, transport: &mut dyn Transport) -> Result<()> {
        transport.write(&self.encode()).await
    }

    pub async fn read(transport: &mut dyn Transport) -> Result<Self> {
        let mut header = [0u8; HEADER_LEN];
        read_exact(transport, &mut header).await?;

        if header[0..2] != PROLOGUE {
            return Err(Error::BadResponse("HiSLIP message missing \"HS\" prologue".into()));
        }
        let message_type = MessageType::from_u8(header[2])?;
        let control_code = header[3];
        let message_parameter = u32::from_be_bytes(header[4..8].try_into().unwrap());
        let payload_length = u64::from_be_bytes(header[8..16].try_into().unwrap()) as usize;

        let mut payload = vec![0u8; payload_length];
        read_exact(transport, &mut payload).await?;

        Ok(Self {
            message_type,
            control_code,
            message_parameter,
            payload,
        })
    }
}

async fn read_exact(transport: &mut dyn Transport, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = transport.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(Error::ConnectionLost("HiSLIP channel closed mid-message".into()));
        }
        filled += n;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_matches_fixed_header_layout() {
        let msg = Message::new(MessageType::Data, 0, 0xFFFF_FF00, b"*IDN?\n".to_vec());
        let encoded = msg.encode();
        assert_eq!(&encoded[0..2], b"HS");
        assert_eq!(encoded[2], MessageType::Data as u8);
        assert_eq!(encoded[3], 0);
        assert_eq!(u32::from_be_bytes(encoded[4..8].try_into().unwrap()), 0xFFFF_FF00);
        assert_eq!(u64::from_be_bytes(encoded[8..16].try_into().unwrap()), 6);
        assert_eq!(&encoded[16..], b"*IDN?\n");
    }
}
