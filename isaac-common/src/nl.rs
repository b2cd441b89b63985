//! Natural-language input: keyword detection and bounded translation.

use crate::adapters::NaturalLanguageTranslationAdapter;
use crate::classify::leading_token;
use crate::error::Failure;
use crate::types::SessionContext;
use tracing::{debug, warn};

/// Leading words that mark a sentence rather than a command.
pub static SENTENCE_STARTERS: &[&str] = &[
    "what", "how", "why", "where", "which", "who", "when", "can", "could", "would", "should",
    "please", "show", "tell", "give", "list", "delete", "remove", "create", "make", "count",
    "i", "is", "are", "do", "does",
];

/// Strip the invocation keyword.
///
/// Returns the query (possibly empty) when `input` starts with `keyword` as a
/// whole word, case-insensitively.
pub fn strip_keyword<'a>(input: &'a str, keyword: &str) -> Option<&'a str> {
    let trimmed = input.trim_start();
    let head_len = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
    let (head, rest) = trimmed.split_at(head_len);
    if head.eq_ignore_ascii_case(keyword) {
        Some(rest.trim())
    } else {
        None
    }
}

/// Heuristic for input that reads like a sentence.
///
/// Known command names never count, so `find . -name x` stays a command.
pub fn looks_like_natural_language(input: &str, session: &SessionContext) -> bool {
    let trimmed = input.trim();
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.len() < 2 {
        return false;
    }
    let Some(first) = leading_token(trimmed) else {
        return false;
    };
    if session.tiers.base_tier(&first).is_some() || session.tiers.override_for(&first).is_some() {
        return false;
    }
    if trimmed.ends_with('?') || SENTENCE_STARTERS.contains(&first.as_str()) {
        return true;
    }
    // Long runs of plain words with no flags, paths or operators.
    words.len() >= 4
        && words
            .iter()
            .all(|w| w.chars().all(|c| c.is_alphabetic() || c == '\'' || c == ','))
}

/// Result of a successful translation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationOutcome {
    /// A command to route from the top.
    Command { command: String, explanation: Option<String> },
    /// Only an explanation; nothing to execute.
    ExplanationOnly(String),
}

/// Call the translator within the session's translation timeout.
pub async fn translate(
    adapter: &dyn NaturalLanguageTranslationAdapter,
    session: &SessionContext,
    query: &str,
) -> Result<TranslationOutcome, Failure> {
    let snapshot = session.snapshot();
    let limit = session.preferences.translation_timeout;
    let call = adapter.translate(query, &session.preferences.shell_name, &snapshot);
    let translation = match tokio::time::timeout(limit, call).await {
        Ok(t) => t,
        Err(_) => {
            warn!(query, timeout_ms = %limit.as_millis(), "Translation timed out");
            return Err(Failure::TranslationFailure {
                reason: format!("no answer within {}s", limit.as_secs()),
            });
        }
    };

    if !translation.success {
        return Err(Failure::TranslationFailure {
            reason: translation
                .error
                .unwrap_or_else(|| "translator reported failure".to_string()),
        });
    }

    let command = translation
        .command
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    match (command, translation.explanation) {
        (Some(command), explanation) => {
            debug!(query, command = %command, "Translated");
            Ok(TranslationOutcome::Command {
                command,
                explanation,
            })
        }
        (None, Some(explanation)) => Ok(TranslationOutcome::ExplanationOnly(explanation)),
        (None, None) => Err(Failure::TranslationFailure {
            reason: "translator returned nothing".to_string(),
        }),
    }
}
