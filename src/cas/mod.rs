//! Symbolic backends.
//!
//! Operations that go beyond rational arithmetic (symbolic limits, inverse
//! Laplace transforms, definite integrals, large determinants) are routed
//! through the [`SymbolicBackend`] trait:
//!
//! - [`NativeBackend`] computes everything in-process. Inverse Laplace
//!   transforms and numeric integration require numeric coefficients.
//! - [`MaximaBackend`] sends a script to an external Maxima process and
//!   reads the printed result back.
//!
//! Backend failures are reported as [`CasError`]. Callers never propagate
//! them as hard errors; they record a [`Derived::Fallback`] or
//! [`Derived::Unavailable`] outcome instead.

mod maxima;
mod native;
pub mod translate;

pub use maxima::MaximaBackend;
pub use native::NativeBackend;

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::symbolic::{Expr, Node, SymMatrix};

/// Failure of a symbolic backend call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CasError {
    /// The external process did not finish in time and was killed
    #[error("CAS call timed out after {0:?}")]
    Timeout(Duration),

    /// The backend produced no result line
    #[error("CAS produced no output")]
    EmptyOutput,

    /// The result line could not be read back
    #[error("Cannot read CAS output '{output}': {message}")]
    Unparseable { output: String, message: String },

    /// The external process could not be started or run
    #[error("Failed to run CAS process: {0}")]
    Process(String),

    /// The backend cannot perform this operation on this input
    #[error("Unsupported CAS operation: {0}")]
    Unsupported(String),
}

impl CasError {
    /// Create an unsupported-operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }
}

/// Operations delegated to a computer algebra system.
pub trait SymbolicBackend {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    /// Determinant of a square matrix.
    fn determinant(&self, m: &SymMatrix) -> Result<Expr, CasError>;

    /// `lim var->point expr`.
    fn limit(&self, expr: &Expr, var: &str, point: f64) -> Result<Expr, CasError>;

    /// Inverse Laplace transform of `expr(s)` as a function of `t`.
    fn inverse_laplace(&self, expr: &Expr, s: &str, t: &str) -> Result<Node, CasError>;

    /// Definite integral of `expr` over `var` from `lower` to `upper`.
    fn integrate(&self, expr: &Expr, var: &str, lower: f64, upper: f64) -> Result<Expr, CasError>;

    /// Solution `x` of `m * x = rhs`.
    fn solve_linear(&self, m: &SymMatrix, rhs: &[Expr]) -> Result<Vec<Expr>, CasError>;
}

/// Outcome of a computation that may fall back to a weaker method.
#[derive(Debug, Clone, PartialEq)]
pub enum Derived<T> {
    /// Computed by the preferred method
    Computed(T),
    /// Computed by a fallback after the preferred method failed
    Fallback { value: T, reason: String },
    /// Neither method produced a value
    Unavailable { reason: String },
}

impl<T> Derived<T> {
    /// The value, if any method produced one.
    pub fn value(&self) -> Option<&T> {
        match self {
            Derived::Computed(v) | Derived::Fallback { value: v, .. } => Some(v),
            Derived::Unavailable { .. } => None,
        }
    }

    /// Consume into the value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Derived::Computed(v) | Derived::Fallback { value: v, .. } => Some(v),
            Derived::Unavailable { .. } => None,
        }
    }

    /// True when the preferred method succeeded.
    pub fn is_computed(&self) -> bool {
        matches!(self, Derived::Computed(_))
    }

    /// Map the contained value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Derived<U> {
        match self {
            Derived::Computed(v) => Derived::Computed(f(v)),
            Derived::Fallback { value, reason } => Derived::Fallback {
                value: f(value),
                reason,
            },
            Derived::Unavailable { reason } => Derived::Unavailable { reason },
        }
    }

    /// Use `result` when it succeeded, otherwise log and try `fallback`.
    pub fn or_fallback(
        what: &str,
        result: Result<T, CasError>,
        fallback: impl FnOnce() -> Option<T>,
    ) -> Derived<T> {
        match result {
            Ok(value) => Derived::Computed(value),
            Err(err) => {
                let reason = format!("{}: {}", what, err);
                match fallback() {
                    Some(value) => {
                        warn!(%reason, "using fallback result");
                        Derived::Fallback { value, reason }
                    }
                    None => {
                        warn!(%reason, "result unavailable");
                        Derived::Unavailable { reason }
                    }
                }
            }
        }
    }

    /// Use `result` when it succeeded, otherwise log and mark unavailable.
    pub fn or_unavailable(what: &str, result: Result<T, CasError>) -> Derived<T> {
        Self::or_fallback(what, result, || None)
    }
}
