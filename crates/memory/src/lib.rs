//! Procedural memory stores for procmem.
//!
//! Records are content-addressed procedures. `search` ranks metadata with
//! BM25 and optional curriculum tiers; `get` returns full content under a
//! per-call budget.

pub mod collection;
pub mod curriculum;
pub mod file_store;
pub mod in_memory;
pub mod pack;
pub mod ranking;

pub use curriculum::classify;
pub use file_store::FileStore;
pub use in_memory::InMemoryStore;
pub use pack::{merge_packs, parse_pack, read_pack, render_pack, write_pack};
