//! Safety tiers and the per-session tier assignment table.
//!
//! Tiers are ordered by strictness:
//! - Tier 1 (`Instant`): execute immediately
//! - Tier 2 (`AutoCorrect`): typo correction, then execute
//! - Tier 2.5 (`AlwaysConfirm`): correction plus a mandatory prompt
//! - Tier 3 (`Validate`): advisory validation plus a mandatory prompt
//! - Tier 4 (`Lockdown`): never executed without the high-friction unlock

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Ordered safety classification of a command.
///
/// Declaration order is strictness order, so `Tier::Lockdown > Tier::Validate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Tier {
    Instant,
    AutoCorrect,
    AlwaysConfirm,
    Validate,
    Lockdown,
}

impl Tier {
    /// All tiers, least strict first.
    pub const ALL: [Tier; 5] = [
        Tier::Instant,
        Tier::AutoCorrect,
        Tier::AlwaysConfirm,
        Tier::Validate,
        Tier::Lockdown,
    ];

    /// Tier level expressed in halves (1 → 2, 2.5 → 5, 4 → 8).
    ///
    /// Keeps the 2.5 tier exact without resorting to floats.
    pub fn level_halves(self) -> u8 {
        match self {
            Tier::Instant => 2,
            Tier::AutoCorrect => 4,
            Tier::AlwaysConfirm => 5,
            Tier::Validate => 6,
            Tier::Lockdown => 8,
        }
    }

    /// Numeric label as shown to users and stored in config files.
    pub fn label(self) -> &'static str {
        match self {
            Tier::Instant => "1",
            Tier::AutoCorrect => "2",
            Tier::AlwaysConfirm => "2.5",
            Tier::Validate => "3",
            Tier::Lockdown => "4",
        }
    }

    /// Snake-case name of the tier.
    pub fn name(self) -> &'static str {
        match self {
            Tier::Instant => "instant",
            Tier::AutoCorrect => "auto_correct",
            Tier::AlwaysConfirm => "always_confirm",
            Tier::Validate => "validate",
            Tier::Lockdown => "lockdown",
        }
    }

    /// Whether the gate must obtain an interactive answer for this tier.
    pub fn always_prompts(self) -> bool {
        matches!(self, Tier::AlwaysConfirm | Tier::Validate)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.name())
    }
}

/// Error returned when a tier label cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown tier '{0}', expected one of: 1, 2, 2.5, 3, 4, instant, auto_correct, always_confirm, validate, lockdown")]
pub struct ParseTierError(pub String);

impl FromStr for Tier {
    type Err = ParseTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "1.0" | "instant" => Ok(Tier::Instant),
            "2" | "2.0" | "auto_correct" | "auto-correct" | "autocorrect" => Ok(Tier::AutoCorrect),
            "2.5" | "always_confirm" | "always-confirm" | "alwaysconfirm" | "confirm" => {
                Ok(Tier::AlwaysConfirm)
            }
            "3" | "3.0" | "validate" => Ok(Tier::Validate),
            "4" | "4.0" | "lockdown" => Ok(Tier::Lockdown),
            _ => Err(ParseTierError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Tier {
    type Error = ParseTierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Tier> for String {
    fn from(tier: Tier) -> Self {
        tier.label().to_string()
    }
}

/// Built-in classification table, keyed by tier label.
///
/// Commands are matched case-insensitively. PowerShell cmdlets sit next to
/// their POSIX counterparts.
pub static DEFAULT_TIERS: &[(Tier, &[&str])] = &[
    (
        Tier::Instant,
        &[
            "ls",
            "cd",
            "clear",
            "cls",
            "pwd",
            "echo",
            "cat",
            "type",
            "Get-ChildItem",
            "Set-Location",
            "Get-Location",
        ],
    ),
    (
        Tier::AutoCorrect,
        &["grep", "Select-String", "head", "tail", "sort", "uniq"],
    ),
    (
        Tier::AlwaysConfirm,
        &["find", "sed", "awk", "Where-Object", "ForEach-Object"],
    ),
    (
        Tier::Validate,
        &[
            "cp",
            "mv",
            "git",
            "npm",
            "pip",
            "reset",
            "Copy-Item",
            "Move-Item",
            "New-Item",
        ],
    ),
    (
        Tier::Lockdown,
        &[
            "rm",
            "del",
            "format",
            "dd",
            "mkfs",
            "shred",
            "Remove-Item",
            "Format-Volume",
            "Clear-Disk",
        ],
    ),
];

/// Where a session override came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideSource {
    /// Explicit administrative configuration (`[tier_overrides]`).
    Administrative,
    /// Added at runtime during this session (`/tier set`).
    Session,
}

/// A single override entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierOverride {
    pub tier: Tier,
    pub source: OverrideSource,
}

/// Errors raised when adding an override.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TierOverrideError {
    /// Runtime overrides may not lower a lockdown command.
    #[error(
        "refusing to lower '{command}' from tier 4 to tier {requested}: lockdown can only be relaxed through [tier_overrides] in the config file"
    )]
    WouldWeakenLockdown { command: String, requested: String },

    /// Runtime overrides may only raise a tier.
    #[error("refusing to lower '{command}' from tier {current} to tier {requested} at runtime")]
    WouldLower {
        command: String,
        current: String,
        requested: String,
    },

    /// Empty command name.
    #[error("override needs a command name")]
    EmptyCommand,
}

/// Base tier table plus session-scoped overrides.
///
/// The base table is shared and never mutated after load; overrides live only
/// as long as this value.
#[derive(Debug, Clone)]
pub struct TierAssignment {
    base: Arc<HashMap<String, Tier>>,
    overrides: HashMap<String, TierOverride>,
}

impl Default for TierAssignment {
    fn default() -> Self {
        Self::from_table(DEFAULT_TIERS.iter().map(|(tier, names)| {
            (*tier, names.iter().map(|n| n.to_string()).collect::<Vec<_>>())
        }))
    }
}

impl TierAssignment {
    /// Build the base table from `(tier, command names)` groups.
    ///
    /// A name listed under several tiers keeps the strictest one.
    pub fn from_table<I>(groups: I) -> Self
    where
        I: IntoIterator<Item = (Tier, Vec<String>)>,
    {
        let mut base: HashMap<String, Tier> = HashMap::new();
        for (tier, names) in groups {
            for name in names {
                let key = fold(&name);
                if key.is_empty() {
                    continue;
                }
                base.entry(key)
                    .and_modify(|existing| *existing = (*existing).max(tier))
                    .or_insert(tier);
            }
        }
        Self {
            base: Arc::new(base),
            overrides: HashMap::new(),
        }
    }

    /// Share this base table with a fresh, override-free session.
    pub fn fork_session(&self) -> Self {
        Self {
            base: Arc::clone(&self.base),
            overrides: HashMap::new(),
        }
    }

    /// Tier from the shipped table only.
    pub fn base_tier(&self, name: &str) -> Option<Tier> {
        self.base.get(&fold(name)).copied()
    }

    /// Session override for a name, if any.
    pub fn override_for(&self, name: &str) -> Option<TierOverride> {
        self.overrides.get(&fold(name)).copied()
    }

    /// Number of entries in the base table.
    pub fn base_len(&self) -> usize {
        self.base.len()
    }

    /// Iterate over base entries (unordered).
    pub fn base_entries(&self) -> impl Iterator<Item = (&str, Tier)> {
        self.base.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Iterate over active overrides (unordered).
    pub fn overrides(&self) -> impl Iterator<Item = (&str, TierOverride)> {
        self.overrides.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Add a session override.
    ///
    /// Strengthening is always allowed. Session overrides never lower a tier;
    /// unlisted names count as tier 3. Lowering a `Lockdown` entry is only
    /// accepted from [`OverrideSource::Administrative`].
    pub fn set_override(
        &mut self,
        name: &str,
        tier: Tier,
        source: OverrideSource,
    ) -> Result<(), TierOverrideError> {
        let key = fold(name);
        if key.is_empty() {
            return Err(TierOverrideError::EmptyCommand);
        }

        let current = self
            .overrides
            .get(&key)
            .map(|o| o.tier)
            .or_else(|| self.base.get(&key).copied());
        let base_lockdown = self.base.get(&key) == Some(&Tier::Lockdown);
        let current_lockdown = current == Some(Tier::Lockdown);

        if (base_lockdown || current_lockdown) && tier < Tier::Lockdown {
            match source {
                OverrideSource::Session => {
                    return Err(TierOverrideError::WouldWeakenLockdown {
                        command: key,
                        requested: tier.label().to_string(),
                    });
                }
                OverrideSource::Administrative => {
                    warn!(
                        command = %key,
                        tier = %tier,
                        "Administrative override lowers a lockdown command"
                    );
                }
            }
        }

        let floor = current.unwrap_or(Tier::Validate);
        if source == OverrideSource::Session && tier < floor {
            return Err(TierOverrideError::WouldLower {
                command: key,
                current: floor.label().to_string(),
                requested: tier.label().to_string(),
            });
        }

        debug!(command = %key, tier = %tier, source = ?source, "Tier override set");
        self.overrides.insert(key, TierOverride { tier, source });
        Ok(())
    }

    /// Remove a session-sourced override. Administrative entries stay.
    pub fn clear_session_override(&mut self, name: &str) -> bool {
        let key = fold(name);
        match self.overrides.get(&key) {
            Some(o) if o.source == OverrideSource::Session => {
                self.overrides.remove(&key);
                true
            }
            _ => false,
        }
    }
}

/// Case-fold a command name for lookup.
pub(crate) fn fold(name: &str) -> String {
    name.trim().to_lowercase()
}
