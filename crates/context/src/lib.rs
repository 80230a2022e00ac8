//! Bounded context assembly for procmem.
//!
//! Four layers are rendered into fixed character budgets:
//!
//! | Layer | Source | Cut |
//! |-------|--------|-----|
//! | L0 orientation | `DomainModel` summary | sentence, line, whitespace |
//! | L1 constraints | `DomainModel` constraints | whole lines |
//! | L2 memory | `MemoryStore` search + get | whole blocks |
//! | L3 guide | reference document | last sentence |

pub mod builder;
pub mod domain;
pub mod layers;
pub mod truncate;

pub use builder::{AssembledContext, ContextBuilder, Layer, LayerStats};
pub use domain::{ClassInfo, Constraint, DomainModel, PropertyInfo};
