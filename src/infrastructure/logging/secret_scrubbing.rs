use regex::{Captures, Regex};
use std::sync::LazyLock;

// Anthropic API keys: sk-ant-api03-...
static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"sk-ant-[a-zA-Z0-9_-]{20,}").expect("api key pattern is valid")
});

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"["']?(?:api_key|apikey|x-api-key|token|secret)["']?\s*[:=]\s*["']?([a-zA-Z0-9_.-]{20,})["']?"#,
    )
    .expect("token pattern is valid")
});

static BEARER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Bearer\s+[a-zA-Z0-9_.-]+").expect("bearer pattern is valid"));

static PASSWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']?password["']?\s*[:=]\s*["']?([^"'\s,}]+)["']?"#)
        .expect("password pattern is valid")
});

/// Redacts credentials from text that is logged or sent to the oracle
///
/// Test output and installer errors can echo environment variables, so both
/// are scrubbed before they leave the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretScrubber;

impl SecretScrubber {
    pub const fn new() -> Self {
        Self
    }

    /// Replace every recognized secret in `message`
    pub fn scrub(&self, message: &str) -> String {
        let scrubbed = API_KEY_RE.replace_all(message, "[API_KEY_REDACTED]");
        let scrubbed = BEARER_RE.replace_all(&scrubbed, "Bearer [TOKEN_REDACTED]");
        let scrubbed = TOKEN_RE.replace_all(&scrubbed, |caps: &Captures| {
            let full_match = &caps[0];
            match full_match.find([':', '=']) {
                Some(pos) => format!("{}{}[REDACTED]", &full_match[..pos], &full_match[pos..=pos]),
                None => "[REDACTED]".to_string(),
            }
        });
        PASSWORD_RE
            .replace_all(&scrubbed, "password=[REDACTED]")
            .into_owned()
    }
}
