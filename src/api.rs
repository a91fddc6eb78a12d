//! LLM API interaction for dream interpretations.
//!
//! This module wraps an OpenAI-compatible chat API behind a small trait so
//! the pipeline can be driven by the real client or by a stub in tests.
//!
//! # Architecture
//!
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`AskFnWrapper`]: Wraps the `awful_aj` library's `ask` function
//! - [`interpret`]: Renders the prompt for a keyword and cleans up the reply
//!
//! Each keyword gets exactly one request. A failed request is reported to
//! the caller, which skips the keyword.

use awful_aj::api::ask;
use awful_aj::{config::AwfulJadeConfig, template::ChatTemplate};
use std::error::Error;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::utils::truncate_for_log;

/// Placeholder replaced by the keyword in a prompt template.
pub const KEYWORD_PLACEHOLDER: &str = "{keyword}";

/// Default prompt: a 3-4 sentence interpretation in a casual, social-thread tone.
pub const DEFAULT_PROMPT: &str =
    "'{keyword}' 꿈에 대한 해몽을 3~4문장으로 앞에 스레드 감성으로 반말로 잘풀어서 설명해줘.";

/// Trait for async LLM interaction.
///
/// Implementors of this trait can send text to an LLM and receive a response.
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper around `awful_aj::api::ask` that implements [`AskAsync`].
///
/// The config carries the API endpoint, key and model; the template carries
/// the system prompt that frames every request.
#[derive(Debug)]
pub struct AskFnWrapper<'a> {
    /// Reference to the LLM configuration (API keys, endpoints, model settings).
    pub config: &'a AwfulJadeConfig,
    /// Reference to the chat template defining the conversation structure.
    pub template: &'a ChatTemplate,
}

impl<'a> AskAsync for AskFnWrapper<'a> {
    type Response = String;

    #[instrument(level = "debug", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(self.config, text.to_string(), self.template, None, None).await;
        let dt = t0.elapsed();

        if let Err(e) = &res {
            warn!(elapsed_ms = dt.as_millis() as u128, error = %e, "API call failed");
        }
        res
    }
}

/// Substitute `keyword` into a prompt template.
pub fn render_prompt(template: &str, keyword: &str) -> String {
    template.replace(KEYWORD_PLACEHOLDER, keyword)
}

/// Ask the LLM to interpret a single keyword.
///
/// # Returns
///
/// The reply with surrounding whitespace removed. An empty reply is treated
/// as a failure so that no blank entry reaches the feed.
#[instrument(level = "info", skip(client, prompt_template))]
pub async fn interpret<A>(
    client: &A,
    prompt_template: &str,
    keyword: &str,
) -> Result<String, Box<dyn Error>>
where
    A: AskAsync<Response = String>,
{
    let prompt = render_prompt(prompt_template, keyword);
    let t0 = Instant::now();
    let reply = client.ask(&prompt).await?;
    let text = reply.trim();
    if text.is_empty() {
        return Err("interpreter returned an empty response".into());
    }

    info!(
        elapsed_ms = t0.elapsed().as_millis() as u128,
        chars = text.chars().count(),
        preview = %truncate_for_log(text, 60),
        "Interpretation generated"
    );
    Ok(text.to_string())
}
