//! Repair oracle backed by the Anthropic Messages API.
//!
//! The model sees the failing requirement set, the pinned specifiers and the
//! tail of the validation output, and must answer with a complete
//! requirements file.

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::domain::errors::OracleError;
use crate::domain::models::{OracleConfig, RequirementSet, RetryConfig};
use crate::domain::ports::{FailureContext, RepairOracle};
use crate::infrastructure::claude::{ClaudeClient, ClaudeClientConfig, MessageRequest};
use crate::infrastructure::logging::SecretScrubber;

const SYSTEM_PROMPT: &str = "You are a Python dependency resolution assistant. \
You repair requirements files so that a project installs and its validation passes. \
You answer with a complete requirements file and nothing else.";

/// [`RepairOracle`] that asks a Claude model for a revised requirement set
pub struct ClaudeRepairOracle {
    client: ClaudeClient,
    model: String,
    max_tokens: u32,
    scrubber: SecretScrubber,
}

impl ClaudeRepairOracle {
    pub fn new(client: ClaudeClient, config: &OracleConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            scrubber: SecretScrubber::new(),
        }
    }

    /// Build the HTTP client and the oracle from loaded configuration
    pub fn from_config(
        api_key: String,
        oracle: &OracleConfig,
        retry: &RetryConfig,
    ) -> Result<Self, OracleError> {
        let client = ClaudeClient::new(ClaudeClientConfig::from_config(api_key, oracle, retry))
            .map_err(|e| OracleError::Request(e.to_string()))?;
        Ok(Self::new(client, oracle))
    }
}

#[async_trait]
impl RepairOracle for ClaudeRepairOracle {
    #[instrument(skip_all, fields(pass_index = context.pass_index, backtrack_index = context.backtrack_index))]
    async fn propose(
        &self,
        previous: &RequirementSet,
        context: &FailureContext,
    ) -> Result<RequirementSet, OracleError> {
        let prompt = build_prompt(previous, context, &self.scrubber);
        let request = MessageRequest::simple_message(&self.model, prompt, self.max_tokens)
            .with_system(SYSTEM_PROMPT)
            .with_temperature(0.0);

        let response = self.client.send_message(&request).await.map_err(|e| {
            let message = self.scrubber.scrub(&e.to_string());
            warn!(error = %message, "Oracle request failed");
            OracleError::Request(message)
        })?;

        if response.stop_reason.as_deref() == Some("max_tokens") {
            warn!("Oracle reply was cut off at max_tokens");
        }

        let proposal = parse_proposal(&response.text())?;
        debug!(requirements = %proposal, "Parsed oracle proposal");
        Ok(proposal)
    }
}

/// Render the repair request for one failed attempt
pub fn build_prompt(
    previous: &RequirementSet,
    context: &FailureContext,
    scrubber: &SecretScrubber,
) -> String {
    let pinned_text = if context.pinned.is_empty() {
        "None".to_string()
    } else {
        context.pinned.to_file_contents()
    };

    let output_text = if context.output_excerpt.trim().is_empty() {
        "(no output captured)".to_string()
    } else {
        scrubber.scrub(&context.output_excerpt)
    };

    format!(
        r"The following requirements failed validation.

## Current Requirements
```text
{current}```

## Pinned Requirements
These lines must appear in your answer exactly as written:
{pinned_text}

## Failure
{reason}

## Validation Output (tail)
```text
{output_text}
```

## Attempt
Pass {pass}, repair {repair}.

## Instructions
1. Identify which packages or versions cause the failure above.
2. Change as few lines as possible.
3. Use one specifier per line, with no pip options such as -r or --index-url.
4. Keep every pinned requirement unchanged.

Respond with the complete revised requirements file in a single ```text code block.",
        current = previous.to_file_contents(),
        reason = context.reason,
        pass = context.pass_index + 1,
        repair = context.backtrack_index + 1,
    )
}

/// Turn the model's reply into a requirement set
///
/// Uses the body of the first fenced code block when one is present and the
/// whole reply otherwise.
pub fn parse_proposal(text: &str) -> Result<RequirementSet, OracleError> {
    if text.trim().is_empty() {
        return Err(OracleError::EmptyResponse);
    }

    let body = extract_code_block(text);
    let proposal =
        RequirementSet::parse(body).map_err(|e| OracleError::MalformedProposal(e.to_string()))?;

    if proposal.is_empty() {
        return Err(OracleError::MalformedProposal(
            "no requirement specifiers found".to_string(),
        ));
    }

    Ok(proposal)
}

fn extract_code_block(text: &str) -> &str {
    let Some(start) = text.find("```") else {
        return text;
    };
    let after_fence = &text[start + 3..];
    // Skip the language tag line
    let body = after_fence
        .find('\n')
        .map_or("", |newline| &after_fence[newline + 1..]);
    body.find("```").map_or(body, |end| &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> FailureContext {
        FailureContext {
            reason: "3 failures exceeded threshold".to_string(),
            output_excerpt: "E ImportError: numpy.core.multiarray failed to import\n".to_string(),
            pinned: RequirementSet::parse("matplotlib==3.8.4\n").unwrap(),
            pass_index: 0,
            backtrack_index: 1,
        }
    }

    #[test]
    fn test_parse_fenced_proposal() {
        let reply = "Numpy 2 breaks the ABI.\n```text\nnumpy<2\nmatplotlib==3.8.4\n```\nDone.";
        let proposal = parse_proposal(reply).unwrap();
        assert_eq!(proposal.to_string(), "[numpy<2, matplotlib==3.8.4]");
    }

    #[test]
    fn test_parse_bare_proposal() {
        let proposal = parse_proposal("numpy==1.26.4\n# comment\npillow>=10\n").unwrap();
        assert_eq!(proposal.len(), 2);
    }

    #[test]
    fn test_parse_unterminated_fence_uses_rest() {
        let proposal = parse_proposal("```\nnumpy==1.26.4\n").unwrap();
        assert_eq!(proposal.len(), 1);
    }

    #[test]
    fn test_parse_empty_reply() {
        assert!(matches!(parse_proposal("  \n"), Err(OracleError::EmptyResponse)));
    }

    #[test]
    fn test_parse_prose_only_is_malformed() {
        let result = parse_proposal("```text\n# nothing to change\n```");
        assert!(matches!(result, Err(OracleError::MalformedProposal(_))));
    }

    #[test]
    fn test_parse_pip_option_is_malformed() {
        let result = parse_proposal("```\n-r base.txt\nnumpy\n```");
        assert!(matches!(result, Err(OracleError::MalformedProposal(_))));
    }

    #[test]
    fn test_prompt_contains_failure_context() {
        let previous = RequirementSet::parse("numpy>=2\nmatplotlib==3.8.4\n").unwrap();
        let prompt = build_prompt(&previous, &context(), &SecretScrubber::new());

        assert!(prompt.contains("numpy>=2\nmatplotlib==3.8.4\n```"));
        assert!(prompt.contains("3 failures exceeded threshold"));
        assert!(prompt.contains("numpy.core.multiarray"));
        assert!(prompt.contains("Pass 1, repair 2."));
        assert!(prompt.contains("matplotlib==3.8.4"));
    }

    #[test]
    fn test_prompt_scrubs_secrets_from_output() {
        let mut ctx = context();
        ctx.output_excerpt = "key sk-ant-REDACTED leaked".to_string();
        let prompt = build_prompt(&RequirementSet::default(), &ctx, &SecretScrubber::new());
        assert!(!prompt.contains("abcdefghijklmnopqrstuvwxyz"));
    }
}
