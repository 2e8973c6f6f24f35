use apollo_compiler::Name;
use apollo_compiler::validation::DiagnosticList;
use apollo_compiler::validation::WithErrors;

/// Errors surfaced while building the compiler context or lowering it.
///
/// The lowering pass itself has no error taxonomy of its own: it assumes the
/// upstream IR invariants already hold, and a violation surfaces as
/// [`LegacyIrError::Internal`] rather than a recoverable variant.
#[derive(Debug, thiserror::Error)]
pub enum LegacyIrError {
    #[error("invalid GraphQL document:\n{0}")]
    Validation(DiagnosticList),
    #[error("anonymous operations are not supported by legacy code generation")]
    AnonymousOperation,
    #[error("unknown fragment `{name}`")]
    UnknownFragment { name: Name },
    #[error("unknown or non-composite type `{name}`")]
    UnknownType { name: Name },
    #[error("{message}")]
    Internal { message: String },
}

impl LegacyIrError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl<T> From<WithErrors<T>> for LegacyIrError {
    fn from(value: WithErrors<T>) -> Self {
        Self::Validation(value.errors)
    }
}
