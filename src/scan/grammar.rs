use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// How a decoded QR payload is turned into a visitor code.
///
/// Codes are alphanumeric-and-hyphen tokens starting with an alphanumeric,
/// at most `max_len` characters, upper-cased on acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CodePolicy {
    /// The whole payload is the token, optionally written as `LABEL: token`.
    #[serde(rename_all = "camelCase")]
    Token { label: Option<String>, max_len: usize },
    /// Find `LABEL token` anywhere in a longer payload.
    #[serde(rename_all = "camelCase")]
    LabeledSearch { label: String, max_len: usize },
}

impl Default for CodePolicy {
    fn default() -> Self {
        CodePolicy::Token {
            label: Some("HN".into()),
            max_len: 32,
        }
    }
}

const TOKEN: &str = r"([A-Za-z0-9][A-Za-z0-9-]*)";

#[derive(Debug, Clone)]
pub struct CodeGrammar {
    pattern: Regex,
    max_len: usize,
}

impl CodeGrammar {
    pub fn new(policy: &CodePolicy) -> Result<Self> {
        let (source, max_len) = match policy {
            CodePolicy::Token { label, max_len } => {
                let prefix = label
                    .as_deref()
                    .filter(|label| !label.is_empty())
                    .map(|label| {
                        let label = regex::escape(label);
                        format!(r"(?:(?i:{label})\s*[:#=]\s*|(?i:{label})\s+)?")
                    })
                    .unwrap_or_default();
                (format!("^{prefix}{TOKEN}$"), *max_len)
            }
            CodePolicy::LabeledSearch { label, max_len } => {
                let label = regex::escape(label);
                (format!(r"\b(?i:{label})\s*[:#=]?\s*{TOKEN}"), *max_len)
            }
        };

        let pattern = Regex::new(&source)
            .with_context(|| format!("invalid code grammar {source}"))?;
        Ok(Self {
            pattern,
            max_len: max_len.max(1),
        })
    }

    /// Normalised code, or `None` when the payload does not follow the grammar.
    pub fn extract(&self, raw: &str) -> Option<String> {
        let captures = self.pattern.captures(raw.trim())?;
        let token = captures.get(1)?.as_str();
        if token.len() > self.max_len {
            return None;
        }
        Some(token.to_ascii_uppercase())
    }
}
