//! # Audio Relay
//!
//! The single-writer core: one worker task owns the producer lock, the
//! accumulation buffer and the playback sink. Sessions reach it only through
//! two channels held by a [`RelayHandle`]:
//!
//! | Channel | Carries |
//! |---------|---------|
//! | frames | [`AudioFrame`] tagged with the sender's lock token |
//! | locks | [`LockRequest`] acquire/release, each with a reply slot |
//!
//! Lock transitions and frame processing are therefore totally ordered.

pub mod accumulator;
pub mod error;
pub mod handle;
pub mod lock;
pub mod storage;
pub mod worker;

pub use error::{RelayError, RelayResult};
pub use handle::{AudioFrame, LockRequest, Relay, RelayHandle, RelayOptions, ReleaseOutcome};
pub use lock::{LockToken, SessionId, NO_TOKEN};
pub use storage::ResultFile;
