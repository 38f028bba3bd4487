// Per-connection session state machine
use bytes::Bytes;
use tracing::{debug, info, warn};

use super::protocol::{ClientMessage, ServerReply};
use crate::relay::{
    AudioFrame, LockToken, RelayError, RelayHandle, RelayResult, ReleaseOutcome, SessionId, NO_TOKEN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
}

/// One connected client.
///
/// The transport loop feeds it text and binary messages and writes back
/// whatever reply it returns. `token` is nonzero only while this session
/// holds the producer lock.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    token: LockToken,
    state: SessionState,
    relay: RelayHandle,
}

impl Session {
    pub fn new(relay: RelayHandle) -> Self {
        Self {
            id: relay.new_session_id(),
            token: NO_TOKEN,
            state: SessionState::Open,
            relay,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn token(&self) -> LockToken {
        self.token
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn holds_lock(&self) -> bool {
        self.token != NO_TOKEN
    }

    /// Handle one control message. Always produces exactly one reply.
    pub async fn handle_text(&mut self, text: &str) -> ServerReply {
        if self.state == SessionState::Closed {
            return ServerReply::error("Session is closed");
        }

        match ClientMessage::parse(text) {
            Ok(message) => self.dispatch(message).await,
            Err(e) => {
                debug!(session = self.id, "Rejected control message: {}", e);
                ServerReply::error(e.to_string())
            }
        }
    }

    async fn dispatch(&mut self, message: ClientMessage) -> ServerReply {
        match message {
            ClientMessage::Ping => ServerReply::pong(),
            ClientMessage::Lock => self.lock().await,
            ClientMessage::Unlock { token } => self.unlock(token).await,
        }
    }

    async fn lock(&mut self) -> ServerReply {
        info!(session = self.id, "Client tried to lock the audio worker");
        match self.relay.request_lock(self.id).await {
            Ok(NO_TOKEN) => ServerReply::error(
                "Failed to lock audio streaming service. There's another client locking it",
            ),
            Ok(token) => {
                self.token = token;
                ServerReply::locked(token)
            }
            Err(e) => ServerReply::error(e.to_string()),
        }
    }

    async fn unlock(&mut self, claimed: Option<LockToken>) -> ServerReply {
        info!(session = self.id, "Client unlocking the audio worker");
        if self.token == NO_TOKEN {
            return ServerReply::error("You are not locking the audio streaming service");
        }
        if claimed.is_some_and(|claimed| claimed != self.token) {
            return ServerReply::error("Invalid token, could not unlock the audio streaming service");
        }

        let token = std::mem::replace(&mut self.token, NO_TOKEN);
        match self.relay.request_release(self.id, token).await {
            Ok(ReleaseOutcome::Flushed { .. }) => ServerReply::unlocked(),
            Ok(ReleaseOutcome::NotHolder) => {
                warn!(session = self.id, token, "Session token no longer matched the relay lock");
                ServerReply::error("The audio streaming service was no longer locked by this client")
            }
            Err(e @ RelayError::Persist { .. }) => {
                ServerReply::error(format!("Audio streaming service unlocked, but the recording was lost: {}", e))
            }
            Err(e) => ServerReply::error(e.to_string()),
        }
    }

    /// Forward a binary frame to the relay, tagged with this session's token.
    ///
    /// Frames from sessions that do not hold the lock are dropped by the worker.
    pub async fn handle_binary(&mut self, data: Bytes) -> RelayResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.relay
            .submit_frame(AudioFrame {
                session: self.id,
                token: self.token,
                data,
            })
            .await
    }

    /// Terminal transition. A holder releases its lock so the recording is
    /// saved and another client can take over.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;

        if self.token == NO_TOKEN {
            return;
        }

        let token = std::mem::replace(&mut self.token, NO_TOKEN);
        info!(session = self.id, "Closing session still holding the lock, releasing it");
        match self.relay.request_release(self.id, token).await {
            Ok(outcome) => debug!(session = self.id, ?outcome, "Released lock on close"),
            Err(e) => warn!(session = self.id, "Failed to release lock on close: {}", e),
        }
    }
}
