//! Voicemail session state machine

mod guard;
pub mod handle;
pub mod history;
pub mod session;

pub use handle::SessionHandle;
pub use history::{SessionHistory, TransitionRecord};
pub use session::VoicemailSession;
