//! Error representation shared by the engine and its collaborators.
//!
//! - **`NbErrorKind`**: the canonical set of error categories (spec §7).
//! - **`ErrorContext`**: optional location info (term path, plan line).
//! - **`NbError`**: one struct gluing kind + message + context together,
//!   in the same shape as `formualizer_common::ExcelError` so diagnostics
//!   stay structured instead of becoming ad hoc strings.

use std::fmt;

use crate::diagnostics::MessageClass;

/// All recognised NodeBrain error categories (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NbErrorKind {
    /// A command or expression could not be parsed by the external parser
    /// but was reported through the core's `error()` contract.
    Parse,
    /// A core invariant was violated (re-entrant alert, hash-chain
    /// inconsistency, publisher with `value == self` subscribed to, ...).
    Logic,
    /// A skill facet method returned a nonzero status.
    Skill,
    /// The OS allocator failed; always fatal.
    OutOfMemory,
    /// A self-test / check-mode assertion did not hold.
    CheckMismatch,
}

impl NbErrorKind {
    /// The log-line class letter this kind reports under (spec §6).
    pub fn class(self) -> MessageClass {
        match self {
            NbErrorKind::Parse => MessageClass::Error,
            NbErrorKind::Logic => MessageClass::LogicError,
            NbErrorKind::Skill => MessageClass::Error,
            NbErrorKind::OutOfMemory => MessageClass::Fatal,
            NbErrorKind::CheckMismatch => MessageClass::CheckError,
        }
    }
}

impl fmt::Display for NbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NbErrorKind::Parse => "parse error",
            NbErrorKind::Logic => "logic error",
            NbErrorKind::Skill => "skill error",
            NbErrorKind::OutOfMemory => "out of memory",
            NbErrorKind::CheckMismatch => "check mismatch",
        })
    }
}

/// Lightweight, collaborator-agnostic location info.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Dotted term path the error concerns, if any.
    pub term_path: Option<String>,
    /// Plan/instruction-stream line, for rule-procedure diagnostics.
    pub plan_line: Option<u32>,
}

/// The error type threaded through fallible core operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}{}", self.message_suffix())]
pub struct NbError {
    pub kind: NbErrorKind,
    pub message: Option<String>,
    pub context: Option<ErrorContext>,
}

impl NbError {
    pub fn new(kind: NbErrorKind) -> Self {
        Self {
            kind,
            message: None,
            context: None,
        }
    }

    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }

    pub fn with_term_path<S: Into<String>>(mut self, path: S) -> Self {
        self.context
            .get_or_insert_with(ErrorContext::default)
            .term_path = Some(path.into());
        self
    }

    pub fn with_plan_line(mut self, line: u32) -> Self {
        self.context.get_or_insert_with(ErrorContext::default).plan_line = Some(line);
        self
    }

    fn message_suffix(&self) -> String {
        match &self.message {
            Some(m) => format!(": {m}"),
            None => String::new(),
        }
    }

    pub fn logic<S: Into<String>>(msg: S) -> Self {
        Self::new(NbErrorKind::Logic).with_message(msg)
    }

    pub fn skill<S: Into<String>>(msg: S) -> Self {
        Self::new(NbErrorKind::Skill).with_message(msg)
    }
}

impl From<NbErrorKind> for NbError {
    fn from(kind: NbErrorKind) -> Self {
        Self::new(kind)
    }
}
