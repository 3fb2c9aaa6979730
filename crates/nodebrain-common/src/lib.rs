//! Shared error and diagnostic types used by the NodeBrain reactive cell
//! engine and its external collaborators (parser, CLI, transports).
//!
//! This crate intentionally knows nothing about cells, terms or rules — it
//! hosts only the vocabulary that both `nodebrain-core` and any future
//! front end need to agree on: error kinds and the `NB<nnn><class>` log
//! message contract.

pub mod diagnostics;
pub mod error;

pub use diagnostics::{ExitCode, MessageClass, MessageId};
pub use error::{NbError, NbErrorKind};
