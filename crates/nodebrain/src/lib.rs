//! Meta crate that re-exports the NodeBrain engine with sensible defaults.
//! Downstream users depend on this crate for the stable top-level surface
//! while retaining access to the underlying crate when deeper integration
//! (direct `Graph`/`RuleScheduler` access, custom skill registries) is
//! needed.

#[cfg(feature = "core")]
pub use nodebrain_core as core;

#[cfg(feature = "core")]
pub use nodebrain_core::{
    api::{Context, Engine, EngineConfig, MockReactor, Reactor},
    CellId, Value,
};

pub use nodebrain_common::{ExitCode, MessageClass, MessageId, NbError, NbErrorKind};
