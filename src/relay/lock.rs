// Producer lock state
// Owned by the relay worker; never shared across tasks

use chrono::Utc;

/// Identifies one connected client for its whole lifetime.
pub type SessionId = u64;

/// Proof of producer ownership handed out on grant.
pub type LockToken = u64;

/// Sentinel meaning "holds no lock".
pub const NO_TOKEN: LockToken = 0;

/// Who may currently produce audio.
///
/// `holder` is `None` exactly when `token` is [`NO_TOKEN`].
#[derive(Debug, Default)]
pub struct LockState {
    holder: Option<SessionId>,
    token: LockToken,
    last_issued: LockToken,
}

impl LockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder(&self) -> Option<SessionId> {
        self.holder
    }

    #[cfg(test)]
    pub fn token(&self) -> LockToken {
        self.token
    }

    #[cfg(test)]
    pub fn is_held(&self) -> bool {
        self.holder.is_some()
    }

    /// Grant the lock to `session` if it is free.
    ///
    /// Returns the new token, the existing token if `session` already holds
    /// the lock, or [`NO_TOKEN`] if another session holds it.
    pub fn try_grant(&mut self, session: SessionId) -> LockToken {
        match self.holder {
            Some(holder) if holder == session => self.token,
            Some(_) => NO_TOKEN,
            None => {
                let token = self.next_token();
                self.holder = Some(session);
                self.token = token;
                token
            }
        }
    }

    /// Clear the lock if `session` holds it with `token`.
    pub fn release(&mut self, session: SessionId, token: LockToken) -> bool {
        if token == NO_TOKEN || self.holder != Some(session) || self.token != token {
            return false;
        }
        self.clear();
        true
    }

    pub fn clear(&mut self) {
        self.holder = None;
        self.token = NO_TOKEN;
    }

    /// Whether a frame tagged with `token` belongs to the current holder.
    pub fn admits(&self, token: LockToken) -> bool {
        token != NO_TOKEN && token == self.token
    }

    // Wall-clock milliseconds, bumped past the previous grant so tokens
    // never repeat within a process and are never zero.
    fn next_token(&mut self) -> LockToken {
        let now = Utc::now().timestamp_millis().max(1) as LockToken;
        let token = now.max(self.last_issued + 1);
        self.last_issued = token;
        token
    }
}
