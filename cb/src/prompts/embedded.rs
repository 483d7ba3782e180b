//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// First-turn diagnosis prompt
pub const DIAGNOSIS: &str = include_str!("../../prompts/diagnosis.pmt");

/// Follow-up question against an existing diagnosis
pub const FOLLOWUP: &str = include_str!("../../prompts/followup.pmt");

/// Free conversation within a session
pub const CHAT: &str = include_str!("../../prompts/chat.pmt");

/// Crop recommendation from field conditions
pub const ADVICE: &str = include_str!("../../prompts/advice.pmt");

/// Farmer question answered with field conditions
pub const QUESTION: &str = include_str!("../../prompts/question.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    let found = match name {
        "diagnosis" => Some(DIAGNOSIS),
        "followup" => Some(FOLLOWUP),
        "chat" => Some(CHAT),
        "advice" => Some(ADVICE),
        "question" => Some(QUESTION),
        _ => None,
    };
    if found.is_none() {
        debug!("get_embedded: no match found");
    }
    found
}
