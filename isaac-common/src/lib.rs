//! Isaac - Common Library
//!
//! Tier classification, confirmation gating, bypass-proof execution and
//! pipeline routing shared by the `isaac` shell and its tests.

#![deny(unsafe_code)]

pub mod adapters;
pub mod audit;
pub mod blob;
pub mod classify;
pub mod config;
pub mod error;
pub mod gate;
pub mod guard;
pub mod heuristics;
pub mod input;
pub mod logging;
pub mod mock;
pub mod nl;
pub mod pipe;
pub mod registry;
pub mod remote;
pub mod router;
pub mod tier;
pub mod types;

pub use adapters::{
    Correction, Corrector, NaturalLanguageTranslationAdapter, PromptError, Prompter,
    RemoteRoutingAdapter, SessionLogger, SessionRecord, ShellError, ShellExecutionAdapter,
    ShellOutput, Translation, ValidationReport, Validator,
};
pub use audit::{AuditEntry, JsonlSessionLogger, NullSessionLogger};
pub use blob::{Blob, BlobContent};
pub use classify::{Classification, TierSource, classify, tier_of};
pub use config::{
    ConfigError, ConfigSource, ConfigWarning, EnvError, EnvParser, IsaacConfig, LayeredConfig,
    Severity, SourceMap, Sourced, validate_config, validate_layered,
};
pub use error::Failure;
pub use gate::{
    Clearance, ConfirmationGate, ConfirmationRequest, GateOptions, PromptKind, Verdict,
};
pub use guard::{BypassGuard, GatedOutput};
pub use heuristics::{HeuristicCorrector, HeuristicValidator};
pub use input::{CommandInput, DeviceRoute, InternalInvocation};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use pipe::{PipeEngine, PipelineSegment, SegmentKind};
pub use registry::{CommandRegistry, InternalCommand};
pub use remote::{DispatchStrategy, Machine, MachineId, MachineRegistry, RoutingError};
pub use router::CommandRouter;
pub use tier::{OverrideSource, Tier, TierAssignment, TierOverride, TierOverrideError};
pub use types::{CommandResult, Note, Preferences, SessionContext, SessionSnapshot};
