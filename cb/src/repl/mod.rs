//! Interactive REPL for CropBot
//!
//! A diagnosis conversation at the terminal, with slash commands for each
//! kind of evidence.

mod command;
mod session;

pub use command::ReplCommand;
pub use session::ReplSession;

use std::sync::Arc;

use eyre::Result;

use crate::engine::ConversationEngine;

/// Run the interactive REPL
///
/// This is the main entry point for `cb` and `cb chat`.
pub async fn run_interactive(engine: Arc<ConversationEngine>, session_id: Option<String>) -> Result<()> {
    let mut session = ReplSession::new(engine, session_id.as_deref());
    session.run().await
}
