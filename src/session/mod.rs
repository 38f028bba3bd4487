// Connection sessions and the control protocol they speak
pub mod protocol;
#[allow(clippy::module_inception)]
pub mod session;

pub use protocol::{ClientMessage, ProtocolError, ReplyKind, ServerReply};
pub use session::{Session, SessionState};
