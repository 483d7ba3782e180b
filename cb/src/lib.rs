//! CropBot - crop disease diagnosis conversations
//!
//! CropBot keeps a session per farmer conversation. Each diagnosis turn takes
//! the strongest piece of evidence available (an image classifier result, a
//! named disease, a description or a list of symptoms), asks a language model
//! for a structured answer, and folds what it learns into the session's
//! diagnosis context so follow-up questions and free chat stay on topic.
//!
//! # Modules
//!
//! - [`domain`] - Requests, replies, turns and the diagnosis context
//! - [`session`] - In-memory session table with eviction
//! - [`prompts`] - Prompt templates and the prompt builder
//! - [`parser`] - Section extraction from model replies
//! - [`llm`] - Language model client trait and providers
//! - [`engine`] - The conversation engine tying it together
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface
//! - [`repl`] - Interactive terminal conversation

pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod llm;
pub mod parser;
pub mod prompts;
pub mod repl;
pub mod session;

// Re-export commonly used types
pub use config::{Config, LlmConfig, PromptConfig, SessionConfig};
pub use domain::{
    ChatResponse, DiagnosisContext, DiagnosisRequest, DiagnosisResponse, FieldSeed, Prediction, PrimarySignal, Sender,
    Turn,
};
pub use engine::{ConversationEngine, EngineError};
pub use llm::{GeminiClient, LlmClient, LlmError, OpenAIClient, create_client};
pub use parser::{ParsedReply, ResponseParser};
pub use prompts::{PromptBuilder, PromptLoader};
pub use session::{Session, SessionError, SessionGuard, SessionHandle, SessionStore};
