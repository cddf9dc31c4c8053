//! System prompt rendering
//!
//! The template is compiled into the binary from `prompts/generate.pmt`.

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use crate::domain::PriorContext;
use crate::guard::Namespace;

pub const GENERATE: &str = include_str!("../../prompts/generate.pmt");

#[derive(Debug, Serialize)]
struct GenerateContext<'a> {
    namespace: &'a str,
    base_prompt: &'a str,
    last_user_instruction: Option<&'a str>,
    has_prior_snapshot: bool,
    max_steps: u32,
}

/// Renders the generation system prompt
pub struct PromptRenderer {
    hbs: Handlebars<'static>,
}

impl PromptRenderer {
    pub fn new() -> Self {
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        Self { hbs }
    }

    pub fn render(&self, namespace: &Namespace, prior: &PriorContext, max_steps: u32) -> Result<String> {
        debug!(%namespace, max_steps, "PromptRenderer::render: called");
        let context = GenerateContext {
            namespace: namespace.as_str(),
            base_prompt: &prior.base_prompt,
            last_user_instruction: prior.last_user_instruction.as_deref(),
            has_prior_snapshot: prior.last_snapshot_ref.is_some(),
            max_steps,
        };
        self.hbs
            .render_template(GENERATE, &context)
            .map_err(|e| eyre!("Failed to render generate prompt: {}", e))
    }
}

impl Default for PromptRenderer {
    fn default() -> Self {
        Self::new()
    }
}
