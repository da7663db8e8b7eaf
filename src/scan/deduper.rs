use std::time::{Duration, Instant};

use super::CodeGrammar;

/// A decode result that passed dedupe and grammar extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedCode {
    pub code: String,
    pub raw_text: String,
    pub accepted_at: Instant,
}

/// Collapses a noisy decode stream into logical "code accepted" events.
///
/// An identical payload within `window` of its last acceptance is a re-read.
/// Payloads the grammar rejects are dropped without touching the dedupe
/// state. With `single_fire` the first accepted code becomes the session's
/// canonical code and everything after it is ignored until `reset`.
#[derive(Debug, Clone)]
pub struct ScanDeduper {
    grammar: CodeGrammar,
    window: Duration,
    single_fire: bool,
    last: Option<(String, Instant)>,
    canonical: Option<AcceptedCode>,
}

impl ScanDeduper {
    pub fn new(grammar: CodeGrammar, window: Duration, single_fire: bool) -> Self {
        Self {
            grammar,
            window,
            single_fire,
            last: None,
            canonical: None,
        }
    }

    pub fn accept(&mut self, raw_text: &str, at: Instant) -> Option<AcceptedCode> {
        if self.single_fire && self.canonical.is_some() {
            return None;
        }

        let text = raw_text.trim();
        if let Some((last_text, last_at)) = &self.last {
            if last_text == text && at.saturating_duration_since(*last_at) <= self.window {
                return None;
            }
        }

        let code = self.grammar.extract(text)?;
        self.last = Some((text.to_string(), at));

        let accepted = AcceptedCode {
            code,
            raw_text: text.to_string(),
            accepted_at: at,
        };
        if self.single_fire {
            self.canonical = Some(accepted.clone());
        }
        Some(accepted)
    }

    pub fn canonical(&self) -> Option<&AcceptedCode> {
        self.canonical.as_ref()
    }

    pub fn is_single_fire(&self) -> bool {
        self.single_fire
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.canonical = None;
    }
}
