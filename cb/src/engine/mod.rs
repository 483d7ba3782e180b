//! Conversation engine
//!
//! Orchestrates one turn: resolve the session, build the prompt, call the
//! model, parse the reply, merge the context and record the exchange.

mod conversation;
mod error;

pub use conversation::{ConversationEngine, PING_PROMPT};
pub use error::EngineError;
