//! Offline corrector and validator.
//!
//! Used when no AI capability is configured. Both are purely lexical:
//! - correction: known-typo table, then a single edit against known names
//! - validation: destructive flags, root targets, device writes, wildcards,
//!   privilege escalation

use crate::adapters::{Correction, Corrector, ValidationReport, Validator};
use crate::classify::leading_token;
use crate::input::tokenize;
use crate::tier::TierAssignment;
use async_trait::async_trait;
use memchr::memmem;
use std::collections::HashMap;

/// Common misspellings of frequently typed commands.
pub static KNOWN_TYPOS: &[(&str, &str)] = &[
    ("grp", "grep"),
    ("gerp", "grep"),
    ("grpe", "grep"),
    ("sl", "ls"),
    ("sls", "ls"),
    ("cta", "cat"),
    ("tial", "tail"),
    ("tali", "tail"),
    ("haed", "head"),
    ("hed", "head"),
    ("sotr", "sort"),
    ("srot", "sort"),
    ("uinq", "uniq"),
    ("fnid", "find"),
    ("fidn", "find"),
    ("sde", "sed"),
    ("akw", "awk"),
    ("gti", "git"),
    ("got", "git"),
    ("claer", "clear"),
    ("ehco", "echo"),
    ("pdw", "pwd"),
];

/// Confidence for a table hit.
const TYPO_CONFIDENCE: f64 = 0.95;
/// Confidence for a unique single-edit match.
const SINGLE_EDIT_CONFIDENCE: f64 = 0.85;
/// Confidence for an ambiguous single-edit match (several candidates).
const AMBIGUOUS_CONFIDENCE: f64 = 0.5;

/// Edit distance between two short strings.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Closest candidate within `max` edits, if unique.
pub fn closest<'a, I>(name: &str, candidates: I, max: usize) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&str, usize)> = None;
    let mut tie = false;
    for candidate in candidates {
        let d = edit_distance(name, candidate);
        if d > max {
            continue;
        }
        match best {
            Some((_, bd)) if d > bd => {}
            Some((_, bd)) if d == bd => tie = true,
            _ => {
                best = Some((candidate, d));
                tie = false;
            }
        }
    }
    if tie { None } else { best.map(|(c, _)| c) }
}

/// Lexical typo corrector for leading tokens.
#[derive(Debug, Clone)]
pub struct HeuristicCorrector {
    known: Vec<String>,
    typos: HashMap<String, String>,
}

impl HeuristicCorrector {
    /// Build from the names in a tier table plus [`KNOWN_TYPOS`].
    pub fn new(tiers: &TierAssignment) -> Self {
        let mut known: Vec<String> = tiers.base_entries().map(|(name, _)| name.to_string()).collect();
        known.sort();
        let typos = KNOWN_TYPOS
            .iter()
            .map(|(typo, fix)| (typo.to_string(), fix.to_string()))
            .collect();
        Self { known, typos }
    }

    fn suggest(&self, token: &str) -> Option<(String, f64)> {
        if self.known.iter().any(|k| k == token) {
            return None;
        }
        if let Some(fix) = self.typos.get(token) {
            return Some((fix.clone(), TYPO_CONFIDENCE));
        }
        // Very short tokens match too many names to be useful.
        if token.chars().count() < 3 {
            return None;
        }
        let candidates: Vec<&String> = self
            .known
            .iter()
            .filter(|k| edit_distance(token, k) == 1)
            .collect();
        match candidates.as_slice() {
            [] => None,
            [only] => Some(((*only).clone(), SINGLE_EDIT_CONFIDENCE)),
            [first, ..] => Some(((*first).clone(), AMBIGUOUS_CONFIDENCE)),
        }
    }
}

#[async_trait]
impl Corrector for HeuristicCorrector {
    async fn correct(&self, command: &str, _shell_name: &str) -> Option<Correction> {
        let token = leading_token(command)?;
        let (fix, confidence) = self.suggest(&token)?;
        let trimmed = command.trim_start();
        let rest = &trimmed[trimmed.find(char::is_whitespace).unwrap_or(trimmed.len())..];
        Some(Correction {
            original: command.to_string(),
            corrected: format!("{fix}{rest}"),
            confidence,
        })
    }
}

/// Leading tokens that escalate privileges.
static ESCALATION: &[&str] = &["sudo", "su", "doas", "runas", "pkexec"];

/// Long flags that skip safety checks or discard data.
static DESTRUCTIVE_FLAGS: &[&str] = &[
    "--force",
    "--hard",
    "--no-preserve-root",
    "--delete",
    "--prune",
    "--recursive",
];

/// Targets that cover a whole filesystem or home directory.
static ROOT_TARGETS: &[&str] = &["/", "/*", "~", "~/", "~/*", "$HOME", "C:\\", "C:\\*", "*"];

/// Substrings that write to raw block devices.
static DEVICE_WRITES: &[&str] = &[
    "of=/dev/sd",
    "of=/dev/nvme",
    "of=/dev/disk",
    "of=/dev/hd",
    "> /dev/sd",
    ">/dev/sd",
    "> /dev/nvme",
    ">/dev/nvme",
];

/// Lexical risk annotator. Never blocks; the gate always prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicValidator;

impl HeuristicValidator {
    pub fn inspect(command: &str) -> ValidationReport {
        let tokens = tokenize(command);
        let mut warnings = Vec::new();
        let mut suggestions = Vec::new();

        if let Some(first) = tokens.first()
            && ESCALATION.contains(&first.to_lowercase().as_str())
        {
            warnings.push(format!("runs with elevated privileges ({first})"));
        }

        for token in tokens.iter().skip(1) {
            let is_short_flag = token.starts_with('-') && !token.starts_with("--");
            if is_short_flag && token.contains('r') && token.contains('f') {
                warnings.push(format!("recursive force flag '{token}'"));
            } else if DESTRUCTIVE_FLAGS.contains(&token.as_str()) {
                warnings.push(format!("destructive flag '{token}'"));
            }
            if ROOT_TARGETS.contains(&token.as_str()) {
                warnings.push(format!("targets a root or home directory ('{token}')"));
            } else if token.contains('*') {
                warnings.push(format!("wildcard '{token}' may match more than intended"));
            }
        }

        let bytes = command.as_bytes();
        if DEVICE_WRITES
            .iter()
            .any(|p| memmem::find(bytes, p.as_bytes()).is_some())
        {
            warnings.push("writes directly to a block device".to_string());
        }
        if memmem::find(bytes, b"chmod 777").is_some() || memmem::find(bytes, b"chmod -R 777").is_some() {
            warnings.push("makes files world-writable".to_string());
        }

        if !warnings.is_empty() {
            suggestions.push("check the target paths before confirming".to_string());
            if warnings.iter().any(|w| w.contains("flag")) {
                suggestions.push("try without the force flag first".to_string());
            }
        }

        ValidationReport {
            safe: warnings.is_empty(),
            warnings,
            suggestions,
        }
    }
}

#[async_trait]
impl Validator for HeuristicValidator {
    async fn validate(&self, command: &str, _shell_name: &str) -> anyhow::Result<ValidationReport> {
        Ok(Self::inspect(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("grep", "grep"), 0);
        assert_eq!(edit_distance("gerp", "grep"), 2);
        assert_eq!(edit_distance("grepp", "grep"), 1);
        assert_eq!(edit_distance("", "ls"), 2);
    }

    #[test]
    fn test_closest_requires_unique_best() {
        let names = ["help", "head", "list"];
        assert_eq!(closest("hlp", names.iter().copied(), 2), Some("help"));
        assert_eq!(closest("zzzzzz", names.iter().copied(), 2), None);
        assert_eq!(closest("hea", ["head", "heap"].iter().copied(), 1), None);
    }

    #[tokio::test]
    async fn test_corrector_typo_table() {
        let corrector = HeuristicCorrector::new(&TierAssignment::default());
        let c = corrector.correct("grp -i foo", "bash").await.unwrap();
        assert_eq!(c.corrected, "grep -i foo");
        assert!(c.confidence >= 0.9);
    }

    #[tokio::test]
    async fn test_corrector_single_edit() {
        let corrector = HeuristicCorrector::new(&TierAssignment::default());
        let c = corrector.correct("sortt file", "bash").await.unwrap();
        assert_eq!(c.corrected, "sort file");
        assert!(corrector.correct("ls -la", "bash").await.is_none());
        assert!(corrector.correct("xy", "bash").await.is_none());
    }

    #[test]
    fn test_validator_flags_risky_commands() {
        let report = HeuristicValidator::inspect("sudo cp -rf * /");
        assert!(!report.safe);
        assert!(report.warnings.iter().any(|w| w.contains("elevated")));
        assert!(report.warnings.iter().any(|w| w.contains("recursive force")));
        assert!(report.warnings.iter().any(|w| w.contains("root")));
        assert!(!report.suggestions.is_empty());

        let report = HeuristicValidator::inspect("dd if=img of=/dev/sda");
        assert!(report.warnings.iter().any(|w| w.contains("block device")));
    }

    #[test]
    fn test_validator_passes_plain_commands() {
        let report = HeuristicValidator::inspect("git status");
        assert!(report.safe);
        assert!(report.warnings.is_empty());
    }
}
