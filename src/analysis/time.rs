//! Time-domain responses through the inverse Laplace transform.

use tracing::warn;

use super::instruction::DataType;
use crate::cas::{Derived, SymbolicBackend};
use crate::config::AnalysisConfig;
use crate::error::{Result, SymnaError};
use crate::symbolic::{Expr, Node};

/// Inverse Laplace transform of a transfer for `step`, `impulse` or `time`.
///
/// `step` transforms `F/s`; `impulse` and `time` transform `F` itself
/// (for `vi`, `F` already carries the excitation). A backend failure is
/// recorded in `warnings` and yields [`Derived::Unavailable`].
pub fn time_response(
    data_type: DataType,
    transfer: &Expr,
    config: &AnalysisConfig,
    backend: &dyn SymbolicBackend,
    warnings: &mut Vec<String>,
) -> Result<Derived<Node>> {
    let s = config.laplace.as_str();
    let image = match data_type {
        DataType::Step => transfer / Expr::symbol(s),
        DataType::Impulse | DataType::Time => transfer.clone(),
        other => {
            return Err(SymnaError::invalid_instruction(format!(
                "'{}' is not a time-domain data type",
                other
            )))
        }
    };
    let out = Derived::or_unavailable(
        &format!("{} response", data_type),
        backend.inverse_laplace(&image, s, &config.time),
    );
    if let Derived::Unavailable { reason } = &out {
        warn!(%reason, "time-domain response unavailable");
        warnings.push(reason.clone());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cas::NativeBackend;
    use approx::assert_relative_eq;

    fn eval_at(node: &Node, t: f64) -> f64 {
        node.eval_real(&|name| (name == "t").then_some(t)).unwrap()
    }

    #[test]
    fn test_first_order_step_and_impulse() {
        let config = AnalysisConfig::default();
        let backend = NativeBackend::new();
        let mut warnings = Vec::new();
        let f = Expr::parse("1/(1 + s/1000)").unwrap();

        let step = time_response(DataType::Step, &f, &config, &backend, &mut warnings).unwrap();
        let step = step.into_value().unwrap();
        assert_relative_eq!(eval_at(&step, 1e-3), 1.0 - (-1.0f64).exp(), max_relative = 1e-6);

        let impulse = time_response(DataType::Impulse, &f, &config, &backend, &mut warnings).unwrap();
        let impulse = impulse.into_value().unwrap();
        assert_relative_eq!(eval_at(&impulse, 0.0), 1000.0, max_relative = 1e-6);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_symbolic_transfer_is_unavailable_natively() {
        let config = AnalysisConfig::default();
        let backend = NativeBackend::new();
        let mut warnings = Vec::new();
        let f = Expr::parse("1/(1 + s*tau)").unwrap();
        let out = time_response(DataType::Time, &f, &config, &backend, &mut warnings).unwrap();
        assert!(out.value().is_none());
        assert_eq!(warnings.len(), 1);
        assert!(time_response(DataType::Laplace, &f, &config, &backend, &mut warnings).is_err());
    }
}
