//! HiSLIP engine: synchronous + asynchronous dual TCP channel (SPEC_FULL.md §4.4, §5).
//!
//! No teacher module covers HiSLIP directly; the two-connection-plus-background-task
//! shape mirrors the `Arc<Mutex<_>>`-shared-stream pattern the teacher uses for its
//! ONC/RPC client (`examples/farlepet-testeq-rs/src/protocol/vxi11/onc.rs`), extended
//! with a `tokio::sync::mpsc` channel for the async channel's server-pushed
//! `AsyncServiceRequest` notifications, per SPEC_FULL.md §5's concurrency note.

pub mod message;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};

use crate::{
    error::{Error, Result},
    status::CompletionReason,
    transport::Transport,
};

use message::{Message, MessageType};

/// First message id a HiSLIP client uses; advances by 2 per `Data`/`DataEnd` sent.
const FIRST_MESSAGE_ID: u32 = 0xFFFF_FF00;

struct AsyncChannelState {
    /// Set by `read_stb` before sending `AsyncStatusQuery`; fulfilled by the
    /// background reader when the matching `AsyncStatusResponse` arrives.
    pending_status: Option<oneshot::Sender<u8>>,
}

pub struct HiSlipLink {
    sync_transport: Mutex<Box<dyn Transport>>,
    async_transport: Arc<Mutex<Box<dyn Transport>>>,
    async_state: Arc<Mutex<AsyncChannelState>>,
    message_id: Mutex<u32>,
    /// Id of the most recent `Data`/`DataEnd` request sent by the client; the next
    /// `read()` accepts only responses whose `message_parameter` matches this,
    /// discarding anything older (SPEC_FULL.md §4.4 resync-on-timeout).
    expected_reply_id: Mutex<u32>,
    srq_rx: Mutex<mpsc::Receiver<u8>>,
    #[allow(dead_code)]
    session_id: u16,
    max_payload: u64,
}
impl HiSlipLink {
    /// Runs the Initialize/AsyncInitialize handshake over two already-connected
    /// channels and spawns the async-channel background reader.
    pub async fn open(
        mut sync_transport: Box<dyn Transport>,
        mut async_transport: Box<dyn Transport>,
        sub_address: &str,
        vendor_id: u16,
    ) -> Result<Self> {
        let mut init_payload = Vec::new();
        init_payload.extend(1u16.to_be_bytes()); // client-protocol major/minor: 1.0
        init_payload.extend(0u16.to_be_bytes());
        init_payload.extend(vendor_id.to_be_bytes());
        init_payload.extend(sub_address.as_bytes());

        Message::new(MessageType::Initialize, 0, 0, init_payload)
            .write(sync_transport.as_mut())
            .await?;
        let response = Message::read(sync_transport.as_mut()).await?;
        if response.message_type != MessageType::InitializeResponse {
            return Err(Error::BadResponse(
                "expected InitializeResponse from HiSLIP server".into(),
            ));
        }
        if response.payload.len() < 4 {
            return Err(Error::BadResponse("InitializeResponse payload too short".into()));
        }
        let session_id = u16::from_be_bytes(response.payload[2..4].try_into().unwrap());

        Message::new(MessageType::AsyncInitialize, 0, session_id as u32, Vec::new())
            .write(async_transport.as_mut())
            .await?;
        let async_response = Message::read(async_transport.as_mut()).await?;
        if async_response.message_type != MessageType::AsyncInitializeResponse {
            return Err(Error::BadResponse(
                "expected AsyncInitializeResponse from HiSLIP server".into(),
            ));
        }

        let (srq_tx, srq_rx) = mpsc::channel(16);
        let async_state = Arc::new(Mutex::new(AsyncChannelState { pending_status: None }));
        let async_transport = Arc::new(Mutex::new(async_transport));

        spawn_async_reader(async_transport.clone(), async_state.clone(), srq_tx);

        Ok(Self {
            sync_transport: Mutex::new(sync_transport),
            async_transport,
            async_state,
            message_id: Mutex::new(FIRST_MESSAGE_ID),
            expected_reply_id: Mutex::new(FIRST_MESSAGE_ID),
            srq_rx: Mutex::new(srq_rx),
            session_id,
            // Conservative default; a real server would advertise this via
            // AsyncMaximumMessageSize, which is out of this engine's required surface.
            max_payload: 1 << 20,
        })
    }

    /// Fragments `data` into `Data` messages, advancing the message id by 2 per
    /// fragment; the final fragment is `DataEnd` when `send_end` is set.
    pub async fn write(&self, data: &[u8], send_end: bool) -> Result<()> {
        let mut sync_transport = self.sync_transport.lock().await;
        let mut message_id = self.message_id.lock().await;

        let chunks: Vec<&[u8]> = if data.is_empty() {
            vec![&[]]
        } else {
            data.chunks(self.max_payload as usize).collect()
        };
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.into_iter().enumerate() {
            let is_last = i == last;
            let message_type = if is_last && send_end {
                MessageType::DataEnd
            } else {
                MessageType::Data
            };
            let sent_id = *message_id;
            Message::new(message_type, 0, sent_id, chunk.to_vec())
                .write(sync_transport.as_mut())
                .await?;
            *message_id = message_id.wrapping_add(2);
            *self.expected_reply_id.lock().await = sent_id;
        }
        Ok(())
    }

    /// Reads `Data` messages until `DataEnd`, a term-char match, or `max_len` bytes.
    /// On a read timeout, resynchronizes by discarding fragments whose message id is
    /// older than the one we are expecting rather than tearing the link down
    /// (SPEC_FULL.md §4.4).
    pub async fn read(
        &self,
        max_len: usize,
        term_char: Option<u8>,
        timeout: Duration,
    ) -> Result<(Vec<u8>, CompletionReason)> {
        let mut sync_transport = self.sync_transport.lock().await;
        let mut collected = Vec::new();
        let expected_id = *self.expected_reply_id.lock().await;

        loop {
            let message = match tokio::time::timeout(timeout, Message::read(sync_transport.as_mut())).await {
                Ok(res) => res?,
                Err(_) => return Err(Error::timeout_with_partial("HiSLIP read timed out", collected)),
            };

            match message.message_type {
                MessageType::Data | MessageType::DataEnd => {
                    if is_stale_reply(message.message_parameter, expected_id) {
                        log::debug!(
                            "discarding stale HiSLIP message id {} (expected {})",
                            message.message_parameter,
                            expected_id
                        );
                        continue;
                    }
                    let is_end = message.message_type == MessageType::DataEnd;
                    collected.extend(message.payload);

                    if let Some(tc) = term_char {
                        if collected.contains(&tc) {
                            return Ok((collected, CompletionReason::TermChar));
                        }
                    }
                    if collected.len() >= max_len {
                        return Ok((collected, CompletionReason::MaxCount));
                    }
                    if is_end {
                        return Ok((collected, CompletionReason::End));
                    }
                }
                MessageType::FatalError => {
                    return Err(Error::SessionInvalidated(
                        "HiSLIP server sent FatalError".into(),
                    ));
                }
                MessageType::Error => {
                    log::warn!("HiSLIP server sent non-fatal Error, continuing");
                }
                other => {
                    log::debug!("ignoring unexpected HiSLIP message type {other:?} on sync channel");
                }
            }
        }
    }

    /// `AsyncStatusQuery`/`AsyncStatusResponse` round trip for `read_stb`.
    pub async fn read_stb(&self, timeout: Duration) -> Result<u8> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.async_state.lock().await;
            state.pending_status = Some(tx);
        }

        let message_id = *self.message_id.lock().await;
        {
            let mut async_transport = self.async_transport.lock().await;
            Message::new(MessageType::AsyncStatusQuery, 0, message_id, Vec::new())
                .write(async_transport.as_mut())
                .await?;
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(stb)) => Ok(stb),
            _ => Err(Error::timeout("no AsyncStatusResponse from HiSLIP server")),
        }
    }

    /// Waits for the next server-pushed service request, if any arrives before
    /// `timeout`.
    pub async fn wait_service_request(&self, timeout: Duration) -> Result<Option<u8>> {
        let mut rx = self.srq_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(stb)) => Ok(Some(stb)),
            Ok(None) => Err(Error::ConnectionLost("HiSLIP async channel closed".into())),
            Err(_) => Ok(None),
        }
    }

    /// `AsyncDeviceClear`, used both for an explicit `clear` and to interrupt a
    /// stuck sync-channel read (SPEC_FULL.md Design Notes, cancellation).
    pub async fn device_clear(&self) -> Result<()> {
        {
            let mut async_transport = self.async_transport.lock().await;
            Message::new(MessageType::AsyncDeviceClear, 0, 0, Vec::new())
                .write(async_transport.as_mut())
                .await?;
        }

        let mut sync_transport = self.sync_transport.lock().await;
        let response = Message::read(sync_transport.as_mut()).await?;
        if response.message_type != MessageType::DeviceClearComplete {
            return Err(Error::BadResponse(
                "expected DeviceClearComplete after AsyncDeviceClear".into(),
            ));
        }

        *self.message_id.lock().await = FIRST_MESSAGE_ID;
        Ok(())
    }

    pub async fn trigger(&self) -> Result<()> {
        let mut sync_transport = self.sync_transport.lock().await;
        let message_id = *self.message_id.lock().await;
        Message::new(MessageType::Trigger, 0, message_id, Vec::new())
            .write(sync_transport.as_mut())
            .await
    }

    /// Enables/disables SO_KEEPALIVE on both the sync and async channel sockets
    /// (SPEC_FULL.md S6).
    pub fn set_keep_alive(&self, enable: bool) -> Result<()> {
        self.sync_transport
            .try_lock()
            .map_err(|_| Error::ResourceBusy("sync channel is busy with an in-flight call".into()))?
            .set_keep_alive(enable)?;
        self.async_transport
            .try_lock()
            .map_err(|_| Error::ResourceBusy("async channel is busy".into()))?
            .set_keep_alive(enable)
    }
}

/// True when `id` precedes `expected` in the 32-bit wrapping message-id sequence,
/// i.e. it belongs to an exchange the client has already abandoned (a fragment left
/// over from before a read timeout triggered `AsyncDeviceClear`).
fn is_stale_reply(id: u32, expected: u32) -> bool {
    (expected.wrapping_sub(id) as i32) > 0
}

fn spawn_async_reader(
    async_transport: Arc<Mutex<Box<dyn Transport>>>,
    state: Arc<Mutex<AsyncChannelState>>,
    srq_tx: mpsc::Sender<u8>,
) {
    tokio::spawn(async move {
        loop {
            let message = {
                let mut transport = async_transport.lock().await;
                Message::read(transport.as_mut()).await
            };
            let message = match message {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("HiSLIP async channel reader stopped: {e}");
                    return;
                }
            };

            match message.message_type {
                MessageType::AsyncServiceRequest => {
                    let stb = message.payload.first().copied().unwrap_or(0);
                    if srq_tx.send(stb).await.is_err() {
                        return;
                    }
                }
                MessageType::AsyncStatusResponse => {
                    let stb = message.payload.first().copied().unwrap_or(0);
                    if let Some(tx) = state.lock().await.pending_status.take() {
                        let _ = tx.send(stb);
                    }
                }
                other => {
                    log::debug!("ignoring HiSLIP async message type {other:?}");
                }
            }
        }
    });
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn message_id_advances_by_two() {
        let mut id = FIRST_MESSAGE_ID;
        id = id.wrapping_add(2);
        assert_eq!(id, 0xFFFF_FF02);
    }

    #[test]
    fn stale_reply_detection_is_older_than_expected() {
        assert!(is_stale_reply(FIRST_MESSAGE_ID, FIRST_MESSAGE_ID.wrapping_add(2)));
        assert!(!is_stale_reply(FIRST_MESSAGE_ID.wrapping_add(2), FIRST_MESSAGE_ID));
        assert!(!is_stale_reply(FIRST_MESSAGE_ID, FIRST_MESSAGE_ID));
    }

    #[test]
    fn stale_reply_detection_handles_wraparound() {
        // id 0xFFFF_FFFE precedes the wrap to 0x0000_0000: stale once 0 is expected.
        assert!(is_stale_reply(0xFFFF_FFFE, 0x0000_0000));
        // id 0x0000_0000 is the one right after the wrap: not stale relative to
        // an expected id from just before it.
        assert!(!is_stale_reply(0x0000_0000, 0xFFFF_FFFE));
    }
}
