//! Prompt Loader
//!
//! Loads prompt templates from files or falls back to embedded defaults.
//! Templates are plain text with `{{variable}}` placeholders; rendering is
//! literal substitution, no escaping.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Context for the extract-task template
#[derive(Debug, Clone, Serialize)]
pub struct ExtractContext {
    pub existing_tasks_json: String,
    pub user_input: String,
    pub current_time_utc: String,
}

/// Context for the breakdown template
#[derive(Debug, Clone, Serialize)]
pub struct BreakdownContext {
    pub task_json: String,
    pub preferences_json: String,
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// Template directory (e.g. `prompts/`)
    template_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader rooted at the given directory; `<dir>/{name}.pmt`
    /// overrides the embedded default of the same name.
    pub fn new(template_dir: impl AsRef<Path>) -> Self {
        let template_dir = template_dir.as_ref().to_path_buf();
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        Self {
            hbs,
            template_dir: if template_dir.exists() { Some(template_dir) } else { None },
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        Self {
            hbs,
            template_dir: None,
        }
    }

    /// Load a template by name
    ///
    /// Checks in order:
    /// 1. File override: `{template_dir}/{name}.pmt`
    /// 2. Embedded fallback
    fn load_template(&self, name: &str) -> Result<String> {
        if let Some(ref dir) = self.template_dir {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!("Loading prompt from file: {:?}", path);
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
        }

        if let Some(content) = embedded::get_embedded(name) {
            debug!("Using embedded prompt: {}", name);
            return Ok(content.to_string());
        }

        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render<C: Serialize>(&self, template_name: &str, context: &C) -> Result<String> {
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }
}
