//! Parameter stepping.

use std::collections::BTreeMap;

use crate::error::{Result, SymnaError};
use crate::symbolic::Expr;

/// Values to step parameters through.
#[derive(Debug, Clone, PartialEq)]
pub enum StepSpec {
    /// One parameter over a list of values
    Single { var: String, values: Vec<f64> },
    /// Several parameters stepped together: step `i` takes element `i` of
    /// every list
    Array { vars: Vec<String>, arrays: Vec<Vec<f64>> },
}

impl StepSpec {
    /// Explicit list of values.
    pub fn list(var: impl Into<String>, values: Vec<f64>) -> Self {
        StepSpec::Single {
            var: var.into(),
            values,
        }
    }

    /// `num` linearly spaced values from `start` to `stop` inclusive.
    pub fn lin(var: impl Into<String>, start: f64, stop: f64, num: usize) -> Result<Self> {
        if num == 0 {
            return Err(SymnaError::invalid_step("number of steps must be positive"));
        }
        let values = if num == 1 {
            vec![start]
        } else {
            let delta = (stop - start) / (num - 1) as f64;
            (0..num).map(|i| start + delta * i as f64).collect()
        };
        Ok(Self::list(var, values))
    }

    /// `num` logarithmically spaced values from `start` to `stop` inclusive.
    pub fn log(var: impl Into<String>, start: f64, stop: f64, num: usize) -> Result<Self> {
        if start <= 0.0 || stop <= 0.0 {
            return Err(SymnaError::invalid_step("logarithmic steps need positive bounds"));
        }
        let mut spec = Self::lin(var, start.log10(), stop.log10(), num)?;
        if let StepSpec::Single { values, .. } = &mut spec {
            values.iter_mut().for_each(|e| *e = 10f64.powf(*e));
        }
        Ok(spec)
    }

    /// Several variables stepped together.
    pub fn array(vars: Vec<String>, arrays: Vec<Vec<f64>>) -> Result<Self> {
        let spec = StepSpec::Array { vars, arrays };
        spec.validate()?;
        Ok(spec)
    }

    /// Stepped variable names.
    pub fn vars(&self) -> Vec<&str> {
        match self {
            StepSpec::Single { var, .. } => vec![var.as_str()],
            StepSpec::Array { vars, .. } => vars.iter().map(String::as_str).collect(),
        }
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        match self {
            StepSpec::Single { values, .. } => values.len(),
            StepSpec::Array { arrays, .. } => arrays.first().map_or(0, Vec::len),
        }
    }

    /// True when there is nothing to step.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check list lengths.
    pub fn validate(&self) -> Result<()> {
        match self {
            StepSpec::Single { values, .. } if values.is_empty() => {
                Err(SymnaError::invalid_step("no step values"))
            }
            StepSpec::Single { .. } => Ok(()),
            StepSpec::Array { vars, arrays } => {
                if vars.is_empty() || vars.len() != arrays.len() {
                    return Err(SymnaError::invalid_step(format!(
                        "{} variables but {} value lists",
                        vars.len(),
                        arrays.len()
                    )));
                }
                let len = arrays[0].len();
                if len == 0 || arrays.iter().any(|a| a.len() != len) {
                    return Err(SymnaError::invalid_step("value lists must be non-empty and of equal length"));
                }
                Ok(())
            }
        }
    }

    /// Variable values of every step, in step order.
    pub fn bindings(&self) -> Result<Vec<BTreeMap<String, f64>>> {
        self.validate()?;
        Ok(match self {
            StepSpec::Single { var, values } => values
                .iter()
                .map(|v| BTreeMap::from([(var.clone(), *v)]))
                .collect(),
            StepSpec::Array { vars, arrays } => (0..self.len())
                .map(|i| {
                    vars.iter()
                        .zip(arrays)
                        .map(|(var, values)| (var.clone(), values[i]))
                        .collect()
                })
                .collect(),
        })
    }

    /// Evaluate `expr` at every step by substitution.
    pub fn apply(&self, expr: &Expr) -> Result<Vec<Expr>> {
        Ok(self
            .bindings()?
            .iter()
            .map(|b| expr.substitute_all(&as_exprs(b)))
            .collect())
    }
}

/// Step values as constant expressions.
pub fn as_exprs(bindings: &BTreeMap<String, f64>) -> BTreeMap<String, Expr> {
    bindings
        .iter()
        .map(|(k, v)| (k.clone(), Expr::constant(*v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_stepping_substitutes_in_order() {
        let spec = StepSpec::list("x", vec![1.0, 2.0, 3.0]);
        let out: Vec<f64> = spec
            .apply(&Expr::parse("x^2").unwrap())
            .unwrap()
            .iter()
            .map(|e| e.as_f64().unwrap())
            .collect();
        assert_eq!(out, vec![1.0, 4.0, 9.0]);
    }

    #[test]
    fn test_array_stepping_is_not_a_cross_product() {
        let spec = StepSpec::array(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![1.0, 2.0], vec![10.0, 20.0]],
        )
        .unwrap();
        let bindings = spec.bindings().unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0]["a"], 1.0);
        assert_eq!(bindings[0]["b"], 10.0);
        assert_eq!(bindings[1]["a"], 2.0);
        assert_eq!(bindings[1]["b"], 20.0);

        let out: Vec<f64> = spec
            .apply(&Expr::parse("100*a + b").unwrap())
            .unwrap()
            .iter()
            .map(|e| e.as_f64().unwrap())
            .collect();
        assert_eq!(out, vec![110.0, 220.0]);
    }

    #[test]
    fn test_spacing_and_validation() {
        let StepSpec::Single { values, .. } = StepSpec::lin("R", 1.0, 2.0, 5).unwrap() else {
            panic!("expected single");
        };
        assert_eq!(values, vec![1.0, 1.25, 1.5, 1.75, 2.0]);

        let StepSpec::Single { values, .. } = StepSpec::log("C", 1e-9, 1e-6, 4).unwrap() else {
            panic!("expected single");
        };
        assert_relative_eq!(values[1], 1e-8, max_relative = 1e-12);
        assert_relative_eq!(values[3], 1e-6, max_relative = 1e-12);

        assert!(StepSpec::log("C", 0.0, 1.0, 3).is_err());
        assert!(StepSpec::array(vec!["a".into()], vec![vec![1.0], vec![2.0]]).is_err());
        assert!(StepSpec::array(vec!["a".into(), "b".into()], vec![vec![1.0], vec![2.0, 3.0]]).is_err());
        assert!(StepSpec::list("x", vec![]).validate().is_err());
    }
}
