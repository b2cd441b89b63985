//! Remote machines, groups and dispatch strategies.
//!
//! Target resolution and selection happen here; execution goes through a
//! [`RemoteRoutingAdapter`](crate::adapters::RemoteRoutingAdapter) only after
//! every selected target has been gated.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::debug;

/// Identifier of a registered machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(pub String);

impl MachineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a group alias expands to machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStrategy {
    /// Every enabled member.
    #[default]
    Broadcast,
    /// One member, rotating per group.
    RoundRobin,
    /// The enabled member with the lowest reported load.
    LeastLoad,
    /// One enabled member chosen uniformly at random.
    Random,
}

impl fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Broadcast => "broadcast",
            Self::RoundRobin => "round_robin",
            Self::LeastLoad => "least_load",
            Self::Random => "random",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for DispatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "broadcast" | "all" => Ok(Self::Broadcast),
            "round_robin" | "round-robin" | "roundrobin" | "rr" => Ok(Self::RoundRobin),
            "least_load" | "least-load" | "leastload" => Ok(Self::LeastLoad),
            "random" => Ok(Self::Random),
            _ => Err(format!(
                "unknown dispatch strategy '{}', expected one of: broadcast, round_robin, least_load, random",
                s
            )),
        }
    }
}

/// A registered remote machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    /// SSH hostname or IP address.
    pub host: String,
    /// SSH user.
    #[serde(default = "default_user")]
    pub user: String,
    /// Optional SSH identity file.
    #[serde(default)]
    pub identity_file: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Last reported load (0.0 = idle). Used by `least_load`.
    #[serde(default)]
    pub load: f64,
}

fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "root".to_string())
}

fn default_true() -> bool {
    true
}

impl Machine {
    pub fn new(id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            id: MachineId::new(id),
            host: host.into(),
            user: default_user(),
            identity_file: None,
            tags: Vec::new(),
            enabled: true,
            load: 0.0,
        }
    }
}

/// Errors while resolving a device alias.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("no machine or group named '{0}'")]
    UnknownTarget(String),

    #[error("group '{0}' has no enabled machines")]
    EmptyGroup(String),

    #[error("'{alias}' is a single machine; strategy '{strategy}' only applies to groups")]
    StrategyOnMachine { alias: String, strategy: DispatchStrategy },

    #[error("machine '{0}' is disabled")]
    Disabled(String),

    #[error("{0}")]
    Unavailable(String),
}

/// Machines and groups known to this session.
#[derive(Debug, Default)]
pub struct MachineRegistry {
    machines: HashMap<MachineId, Machine>,
    groups: HashMap<String, Vec<MachineId>>,
    round_robin: HashMap<String, AtomicUsize>,
    default_strategy: DispatchStrategy,
}

impl MachineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a machine.
    pub fn register(&mut self, machine: Machine) {
        self.machines.insert(machine.id.clone(), machine);
    }

    /// Define a group. Unknown member ids are kept and skipped at resolution.
    pub fn define_group(&mut self, name: impl Into<String>, members: Vec<MachineId>) {
        let name = name.into();
        self.round_robin
            .entry(name.clone())
            .or_insert_with(|| AtomicUsize::new(0));
        self.groups.insert(name, members);
    }

    /// Strategy used for groups when the route names none.
    pub fn set_default_strategy(&mut self, strategy: DispatchStrategy) {
        self.default_strategy = strategy;
    }

    pub fn default_strategy(&self) -> DispatchStrategy {
        self.default_strategy
    }

    pub fn machine(&self, id: &MachineId) -> Option<&Machine> {
        self.machines.get(id)
    }

    pub fn machines(&self) -> impl Iterator<Item = &Machine> {
        self.machines.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &[MachineId])> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Update the reported load of a machine.
    pub fn report_load(&mut self, id: &MachineId, load: f64) -> bool {
        match self.machines.get_mut(id) {
            Some(m) => {
                m.load = load;
                true
            }
            None => false,
        }
    }

    /// Expand an alias into concrete targets.
    ///
    /// A machine alias resolves to itself. A group alias resolves according
    /// to `strategy`, falling back to the registry default (broadcast unless
    /// configured).
    pub fn resolve(
        &self,
        alias: &str,
        strategy: Option<DispatchStrategy>,
    ) -> Result<Vec<MachineId>, RoutingError> {
        let machine_id = MachineId::new(alias);
        if let Some(machine) = self.machines.get(&machine_id) {
            if let Some(strategy) = strategy {
                return Err(RoutingError::StrategyOnMachine {
                    alias: alias.to_string(),
                    strategy,
                });
            }
            if !machine.enabled {
                return Err(RoutingError::Disabled(alias.to_string()));
            }
            return Ok(vec![machine_id]);
        }

        let Some(members) = self.groups.get(alias) else {
            return Err(RoutingError::UnknownTarget(alias.to_string()));
        };

        let candidates: Vec<&Machine> = members
            .iter()
            .filter_map(|id| self.machines.get(id))
            .filter(|m| m.enabled)
            .collect();
        if candidates.is_empty() {
            return Err(RoutingError::EmptyGroup(alias.to_string()));
        }

        let strategy = strategy.unwrap_or(self.default_strategy);
        let selected = match strategy {
            DispatchStrategy::Broadcast => candidates.iter().map(|m| m.id.clone()).collect(),
            DispatchStrategy::RoundRobin => {
                let counter = self
                    .round_robin
                    .get(alias)
                    .map(|c| c.fetch_add(1, Ordering::Relaxed))
                    .unwrap_or(0);
                vec![candidates[counter % candidates.len()].id.clone()]
            }
            DispatchStrategy::LeastLoad => {
                let best = candidates
                    .iter()
                    .min_by(|a, b| a.load.total_cmp(&b.load))
                    .map(|m| m.id.clone());
                best.into_iter().collect()
            }
            DispatchStrategy::Random => {
                let idx = rand::thread_rng().gen_range(0..candidates.len());
                vec![candidates[idx].id.clone()]
            }
        };

        debug!(alias, %strategy, targets = selected.len(), "Resolved device route");
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MachineRegistry {
        let mut reg = MachineRegistry::new();
        let mut a = Machine::new("a", "10.0.0.1");
        a.load = 0.7;
        let mut b = Machine::new("b", "10.0.0.2");
        b.load = 0.2;
        let mut c = Machine::new("c", "10.0.0.3");
        c.enabled = false;
        reg.register(a);
        reg.register(b);
        reg.register(c);
        reg.define_group(
            "web",
            vec![MachineId::new("a"), MachineId::new("b"), MachineId::new("c")],
        );
        reg.define_group("dead", vec![MachineId::new("c"), MachineId::new("ghost")]);
        reg
    }

    #[test]
    fn test_strategy_parse_roundtrip() {
        for s in [
            DispatchStrategy::Broadcast,
            DispatchStrategy::RoundRobin,
            DispatchStrategy::LeastLoad,
            DispatchStrategy::Random,
        ] {
            assert_eq!(s.to_string().parse::<DispatchStrategy>().unwrap(), s);
        }
        assert!("fastest".parse::<DispatchStrategy>().is_err());
    }

    #[test]
    fn test_resolve_single_machine() {
        let reg = registry();
        assert_eq!(reg.resolve("a", None).unwrap(), vec![MachineId::new("a")]);
        assert!(matches!(
            reg.resolve("c", None),
            Err(RoutingError::Disabled(_))
        ));
        assert!(matches!(
            reg.resolve("a", Some(DispatchStrategy::Random)),
            Err(RoutingError::StrategyOnMachine { .. })
        ));
    }

    #[test]
    fn test_resolve_broadcast_skips_disabled() {
        let reg = registry();
        let mut targets = reg.resolve("web", None).unwrap();
        targets.sort();
        assert_eq!(targets, vec![MachineId::new("a"), MachineId::new("b")]);
    }

    #[test]
    fn test_registry_default_strategy_applies_to_groups() {
        let mut reg = registry();
        reg.set_default_strategy(DispatchStrategy::LeastLoad);
        assert_eq!(reg.resolve("web", None).unwrap(), vec![MachineId::new("b")]);
        assert_eq!(reg.resolve("a", None).unwrap(), vec![MachineId::new("a")]);
    }

    #[test]
    fn test_resolve_least_load() {
        let reg = registry();
        let targets = reg.resolve("web", Some(DispatchStrategy::LeastLoad)).unwrap();
        assert_eq!(targets, vec![MachineId::new("b")]);
    }

    #[test]
    fn test_resolve_round_robin_rotates() {
        let reg = registry();
        let first = reg.resolve("web", Some(DispatchStrategy::RoundRobin)).unwrap();
        let second = reg.resolve("web", Some(DispatchStrategy::RoundRobin)).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_ne!(first, second);
    }

    #[test]
    fn test_resolve_random_picks_member() {
        let reg = registry();
        let targets = reg.resolve("web", Some(DispatchStrategy::Random)).unwrap();
        assert_eq!(targets.len(), 1);
        assert!(targets[0] == MachineId::new("a") || targets[0] == MachineId::new("b"));
    }

    #[test]
    fn test_resolve_errors() {
        let reg = registry();
        assert!(matches!(
            reg.resolve("nope", None),
            Err(RoutingError::UnknownTarget(_))
        ));
        assert!(matches!(
            reg.resolve("dead", None),
            Err(RoutingError::EmptyGroup(_))
        ));
    }

    #[test]
    fn test_report_load() {
        let mut reg = registry();
        assert!(reg.report_load(&MachineId::new("a"), 0.0));
        assert!(!reg.report_load(&MachineId::new("zzz"), 0.0));
        let targets = reg.resolve("web", Some(DispatchStrategy::LeastLoad)).unwrap();
        assert_eq!(targets, vec![MachineId::new("a")]);
    }
}
