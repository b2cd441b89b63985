//! Tier classification of shell commands.
//!
//! The tier is a function of the leading token only. Arguments such as `-rf`
//! do not change the result. The token is read the way the shell reads it, so
//! `"rm"`, `'rm'` and `\rm` all classify as `rm`.

use crate::input::tokenize;
use crate::tier::{Tier, fold};
use crate::types::SessionContext;
use serde::{Deserialize, Serialize};

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierSource {
    /// Session override map.
    Override,
    /// Shipped base table.
    Base,
    /// Name not found; the session's unknown-command tier applied.
    Default,
}

/// Result of classifying one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Case-folded leading token.
    pub name: String,
    pub tier: Tier,
    pub source: TierSource,
}

impl Classification {
    /// True when no table knew the name.
    pub fn is_unknown(&self) -> bool {
        self.source == TierSource::Default
    }
}

/// Case-folded leading token with shell quoting and escapes removed.
pub fn leading_token(command: &str) -> Option<String> {
    tokenize(command)
        .into_iter()
        .next()
        .map(|token| fold(token.trim_start_matches('\\')))
}

/// Classify a command against the session's tier tables.
pub fn classify(session: &SessionContext, command: &str) -> Classification {
    let default_tier = session.preferences.unknown_tier.max(Tier::Validate);

    let Some(name) = leading_token(command) else {
        return Classification {
            name: String::new(),
            tier: default_tier,
            source: TierSource::Default,
        };
    };

    if let Some(entry) = session.tiers.override_for(&name) {
        return Classification {
            name,
            tier: entry.tier,
            source: TierSource::Override,
        };
    }

    if let Some(tier) = session.tiers.base_tier(&name) {
        return Classification {
            name,
            tier,
            source: TierSource::Base,
        };
    }

    Classification {
        name,
        tier: default_tier,
        source: TierSource::Default,
    }
}

/// Tier of a command.
pub fn tier_of(session: &SessionContext, command: &str) -> Tier {
    classify(session, command).tier
}
