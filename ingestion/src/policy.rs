use alayasiki_core::config::GuardrailsConfig;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("forbidden content detected: {0}")]
    ForbiddenContent(String),
}

pub trait ContentPolicy: Send + Sync {
    fn apply(&self, text: &str) -> Result<String, PolicyError>;
}

pub struct NoOpPolicy;

impl ContentPolicy for NoOpPolicy {
    fn apply(&self, text: &str) -> Result<String, PolicyError> {
        Ok(text.to_string())
    }
}

/// Content guardrails applied to extracted chunk text before it is persisted
/// or embedded, parameterized by `GuardrailsConfig` rather than hardcoded
/// thresholds.
pub struct BasicPolicy {
    banned_phrases: Vec<String>,
    mask_pii: bool,
    max_input_chars: usize,
}

impl BasicPolicy {
    pub fn new(config: &GuardrailsConfig) -> Self {
        Self {
            banned_phrases: config.banned_phrases.iter().map(|p| p.to_lowercase()).collect(),
            mask_pii: config.mask_pii,
            max_input_chars: config.max_input_chars,
        }
    }
}

impl ContentPolicy for BasicPolicy {
    fn apply(&self, text: &str) -> Result<String, PolicyError> {
        let lowered = text.to_lowercase();
        for phrase in &self.banned_phrases {
            if lowered.contains(phrase.as_str()) {
                return Err(PolicyError::ForbiddenContent(phrase.clone()));
            }
        }

        let mut out = if self.mask_pii {
            mask_pii(text)
        } else {
            text.to_string()
        };

        if out.len() > self.max_input_chars {
            out.truncate(self.max_input_chars);
        }

        Ok(out)
    }
}

fn mask_pii(text: &str) -> String {
    let mut out = Vec::new();
    for token in text.split_whitespace() {
        if looks_like_email(token) {
            out.push("[EMAIL]".to_string());
        } else if looks_like_phone(token) {
            out.push("[PHONE]".to_string());
        } else {
            out.push(token.to_string());
        }
    }
    out.join(" ")
}

fn looks_like_email(token: &str) -> bool {
    token.contains('@') && token.contains('.')
}

fn looks_like_phone(token: &str) -> bool {
    let digit_count = token.chars().filter(|c| c.is_ascii_digit()).count();
    digit_count >= 7
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(banned: &[&str], mask_pii: bool, max_chars: usize) -> GuardrailsConfig {
        GuardrailsConfig {
            max_input_chars: max_chars,
            banned_phrases: banned.iter().map(|s| s.to_string()).collect(),
            mask_pii,
        }
    }

    #[test]
    fn rejects_banned_phrases_case_insensitively() {
        let policy = BasicPolicy::new(&config(&["classified"], false, 6000));
        let err = policy.apply("this is CLASSIFIED material").unwrap_err();
        assert!(matches!(err, PolicyError::ForbiddenContent(_)));
    }

    #[test]
    fn masks_emails_and_phone_numbers() {
        let policy = BasicPolicy::new(&config(&[], true, 6000));
        let out = policy.apply("contact jane@example.com or 555-123-4567").unwrap();
        assert!(out.contains("[EMAIL]"));
        assert!(out.contains("[PHONE]"));
    }

    #[test]
    fn truncates_to_max_input_chars() {
        let policy = BasicPolicy::new(&config(&[], false, 5));
        let out = policy.apply("abcdefghij").unwrap();
        assert_eq!(out, "abcde");
    }

    #[test]
    fn no_op_policy_passes_text_through() {
        let policy = NoOpPolicy;
        assert_eq!(policy.apply("anything@x.com").unwrap(), "anything@x.com");
    }
}
