//! Mediation: permission gating, interactive decisions, argument reshaping.
//!
//! Only `tools/call` and `prompts/get` are gated; every other method passes
//! through untouched. Gating consults the in-memory permission cache first
//! and falls back to an interactive decision source, an injectable
//! collaborator so tests can script the operator. Non-interactive processes
//! never prompt: a gated miss becomes a structured refusal instead.

pub mod decision;
pub mod drunk;
pub mod modify;
pub mod permissions;

pub use decision::{
    DecisionSource, MissingToolDecision, PromptDecision, ScriptedDecisions, TerminalDecisions,
    ToolDecision,
};
pub use drunk::reshape_arguments;
pub use modify::{parse_modification, Modification};
pub use permissions::{canonical_arguments, PermissionCache, ALLOW_ALL_KEY};
