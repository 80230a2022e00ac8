//! # procmem core
//!
//! Domain types, traits, and error definitions for procedural memory and
//! bounded context assembly. This crate has **no framework dependencies**;
//! it defines the model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here (`MemoryStore`, `Provider`, `QueryEngine`,
//! `Tool`). Implementations live in their respective crates, so runs can
//! swap backends via configuration and tests can plug in stubs.

pub mod error;
pub mod event;
pub mod handle;
pub mod memory;
pub mod message;
pub mod provider;
pub mod query;
pub mod tool;
pub mod trajectory;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use handle::Ref;
pub use memory::{
    CurriculumLevel, CurriculumScope, MemoryHit, MemoryItem, MemoryQuery, MemoryStore,
    Provenance, SourceType,
};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage, complete_text};
pub use query::{QueryEngine, Row};
pub use tool::{Tool, ToolCall, ToolDefinition, ToolRegistry, ToolResult, parse_arguments};
pub use trajectory::{Judgment, Step, Termination, Trajectory, Verdict};
