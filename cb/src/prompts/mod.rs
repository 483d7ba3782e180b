//! Prompt Template System
//!
//! Renders requests, bounded history and the diagnosis context into the
//! single prompt string sent to the language model.
//!
//! Template loading chain:
//! 1. `{prompts.dir}/{name}.pmt` (override directory from config)
//! 2. Embedded fallback compiled into the binary
//!
//! Templates use Handlebars syntax for variable substitution.

mod builder;
pub mod embedded;
mod loader;

pub use builder::PromptBuilder;
pub use loader::PromptLoader;
