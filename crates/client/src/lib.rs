//! Client core for resort chat: a backend handle, a per-conversation live
//! subscription, and the state that merges them into one timeline.

pub mod backend;
pub mod error;
pub mod realtime;
pub mod session;
pub mod timeline;
pub mod typing;

pub use backend::{ChatBackend, HttpBackend};
pub use error::ClientError;
pub use realtime::{await_confirmation, Confirmation, Subscription, CONFIRM_TIMEOUT};
pub use session::{ChatSession, SessionState};
pub use timeline::{Timeline, TimelineEvent};
pub use typing::{TypingDebouncer, TypingIndicators, TypingSignal};
