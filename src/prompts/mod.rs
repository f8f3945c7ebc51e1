//! Prompt templates
//!
//! Prompts are data: addressed by name, loaded from the template directory
//! with embedded fallbacks. Core logic holds no prompt strings.

pub mod embedded;
mod loader;

pub use loader::{BreakdownContext, ExtractContext, PromptLoader};
