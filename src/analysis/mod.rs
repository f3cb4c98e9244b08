//! Instruction execution.
//!
//! [`execute`] runs one [`Instruction`] against a [`Circuit`]:
//!
//! 1. The circuit and the instruction are validated.
//! 2. The MNA system is assembled with the gain type's loop-gain reference
//!    override.
//! 3. The data type's intermediate (matrix, solution, numerator and
//!    denominator, or noise contributions) is derived.
//! 4. The intermediate is finished into a [`Response`].
//!
//! With a step specification, the substitution mode derives the
//! intermediate once with the stepped parameters left symbolic and
//! finishes it per step; the rebuild mode re-derives it for every step
//! with patched parameter definitions.

pub mod instruction;
pub mod laplace;
pub mod noise;
pub mod positions;
pub mod response;
pub mod stepping;
pub mod time;
pub mod transfer;

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::cas::{Derived, SymbolicBackend};
use crate::circuit::{validate_circuit, Circuit};
use crate::config::AnalysisConfig;
use crate::error::{Result, SymnaError};
use crate::solver::{loop_gain_reference, MatrixBuilder, MnaSystem, SourceParam};
use crate::symbolic::Expr;

pub use instruction::{DataType, Detector, GainType, Instruction};
pub use laplace::{Factored, Laplace, Normalized};
pub use noise::{NoiseKind, NoiseResult};
pub use positions::{make_src_det_pos, Positions};
pub use response::{AnalysisResult, Response};
pub use stepping::StepSpec;
pub use transfer::{Determinants, ReferenceValue};

use stepping::as_exprs;
use transfer::{poles_and_zeros, polynomial_roots, report_roots, solve_system, zero_frequency_value};

/// Intermediate result shared by all steps of a substitution run.
enum Derivation {
    System(MnaSystem),
    Solution(Derived<Vec<Expr>>),
    Transfer { numer: Option<Expr>, denom: Option<Expr> },
    Noise(NoiseResult),
}

/// One instruction bound to its configuration and backend.
struct Analysis<'a> {
    instruction: &'a Instruction,
    config: &'a AnalysisConfig,
    backend: &'a dyn SymbolicBackend,
}

fn needs_numer(data_type: DataType) -> bool {
    matches!(
        data_type,
        DataType::Numer
            | DataType::Zeros
            | DataType::Pz
            | DataType::Laplace
            | DataType::Dc
            | DataType::Step
            | DataType::Impulse
            | DataType::Time
    )
}

fn needs_denom(data_type: DataType) -> bool {
    matches!(
        data_type,
        DataType::Denom
            | DataType::Poles
            | DataType::Pz
            | DataType::Laplace
            | DataType::Dc
            | DataType::Step
            | DataType::Impulse
            | DataType::Time
    )
}

impl<'a> Analysis<'a> {
    fn source_param(&self) -> SourceParam {
        match (self.instruction.data_type, self.instruction.gain_type) {
            (DataType::DcSolve, _) | (DataType::Dc, GainType::Vi) => SourceParam::Dc,
            _ => SourceParam::Value,
        }
    }

    fn derive(&self, circuit: &Circuit, params: &BTreeMap<String, Expr>, warnings: &mut Vec<String>) -> Result<Derivation> {
        let ins = self.instruction;
        let builder = MatrixBuilder::new(circuit, self.config)
            .with_params(params)
            .numeric(ins.is_numeric())
            .with_sources(self.source_param())
            .with_gain_type(ins.gain_type, ins.lg_ref.as_deref())?;
        let sys = builder.build()?;
        warnings.extend(sys.warnings.iter().cloned());
        let dets = Determinants::new(self.config, self.backend);
        let s = self.config.laplace.as_str();

        let derivation = match ins.data_type {
            DataType::Matrix => Derivation::System(sys),
            DataType::Solve => Derivation::Solution(solve_system(&sys, &dets, self.backend)),
            DataType::DcSolve => {
                let solution = solve_system(&sys, &dets, self.backend).map(|values| {
                    values
                        .iter()
                        .map(|v| {
                            zero_frequency_value(v, s, self.backend)
                                .into_value()
                                .unwrap_or_else(Expr::undefined)
                        })
                        .collect()
                });
                Derivation::Solution(solution)
            }
            DataType::Noise => Derivation::Noise(noise::noise(&sys, &builder, ins, &dets, self.config, warnings)?),
            DataType::DcVar => Derivation::Noise(noise::dc_variance(
                &sys,
                &builder,
                ins,
                &dets,
                self.config,
                self.backend,
                warnings,
            )?),
            data_type => {
                let with_numer = needs_numer(data_type);
                let positions = if with_numer || ins.gain_type == GainType::Servo {
                    make_src_det_pos(&sys, circuit, ins)?
                } else {
                    Positions::default()
                };
                let reference = if ins.gain_type.is_loop_type() {
                    let el = loop_gain_reference(circuit, ins.lg_ref.as_deref())?;
                    let (numer, denom) = builder.value_parts(el);
                    Some(ReferenceValue { numer, denom })
                } else {
                    None
                };
                let numer = if with_numer {
                    Some(dets.numerator(&sys, ins.gain_type, reference.as_ref(), &positions)?)
                } else {
                    None
                };
                let denom = if needs_denom(data_type) {
                    Some(dets.denominator(&sys, ins.gain_type, reference.as_ref(), &positions)?)
                } else {
                    None
                };
                Derivation::Transfer { numer, denom }
            }
        };
        debug!(data_type = %ins.data_type, gain_type = %ins.gain_type, "intermediate derived");
        Ok(derivation)
    }

    fn finish(
        &self,
        derivation: &Derivation,
        bindings: Option<&BTreeMap<String, Expr>>,
        warnings: &mut Vec<String>,
    ) -> Result<Response> {
        let subst = |e: &Expr| match bindings {
            Some(b) => e.substitute_all(b),
            None => e.clone(),
        };
        let s = self.config.laplace.as_str();
        let data_type = self.instruction.data_type;

        Ok(match derivation {
            Derivation::System(sys) => Response::Matrix {
                matrix: sys.matrix.map(subst),
                dv: sys.dv.clone(),
                iv: sys.iv.iter().map(subst).collect(),
            },
            Derivation::Solution(solution) => {
                let values = solution.clone().map(|v| v.iter().map(subst).collect());
                if data_type == DataType::DcSolve {
                    Response::DcSolve(values)
                } else {
                    Response::Solve(values)
                }
            }
            Derivation::Noise(result) => {
                let result = match bindings {
                    Some(b) => result.substitute(b),
                    None => result.clone(),
                };
                if result.is_variance {
                    Response::DcVar(result)
                } else {
                    Response::Noise(result)
                }
            }
            Derivation::Transfer { numer, denom } => {
                let missing = || SymnaError::invalid_instruction(format!("{} intermediate missing", data_type));
                let numer = numer.as_ref().map(subst);
                let denom = denom.as_ref().map(subst);
                match data_type {
                    DataType::Denom => Response::Denom(denom.ok_or_else(missing)?),
                    DataType::Numer => Response::Numer(numer.ok_or_else(missing)?),
                    DataType::Poles => {
                        let roots = polynomial_roots(&denom.ok_or_else(missing)?, s)?;
                        Response::Poles(report_roots(roots, self.config))
                    }
                    DataType::Zeros => {
                        let roots = polynomial_roots(&numer.ok_or_else(missing)?, s)?;
                        Response::Zeros(report_roots(roots, self.config))
                    }
                    DataType::Pz => {
                        let (n, d) = (numer.ok_or_else(missing)?, denom.ok_or_else(missing)?);
                        let (poles, zeros) = poles_and_zeros(&n, &d, self.config)?;
                        Response::Pz {
                            poles: report_roots(poles, self.config),
                            zeros: report_roots(zeros, self.config),
                            dc_value: zero_frequency_value(&(&n / &d), s, self.backend),
                        }
                    }
                    DataType::Laplace => {
                        let out = laplace::transform(&numer.ok_or_else(missing)?, &denom.ok_or_else(missing)?, self.config)?;
                        warnings.extend(out.warnings.iter().cloned());
                        Response::Laplace(out)
                    }
                    DataType::Dc => {
                        let f = numer.ok_or_else(missing)? / denom.ok_or_else(missing)?;
                        Response::Dc(zero_frequency_value(&f, s, self.backend))
                    }
                    DataType::Step | DataType::Impulse | DataType::Time => {
                        let f = numer.ok_or_else(missing)? / denom.ok_or_else(missing)?;
                        Response::Time(time::time_response(data_type, &f, self.config, self.backend, warnings)?)
                    }
                    other => {
                        return Err(SymnaError::invalid_instruction(format!(
                            "'{}' is not a transfer data type",
                            other
                        )))
                    }
                }
            }
        })
    }

    /// Derive and finish once; `dcvar` first re-injects its sources.
    fn run(
        &self,
        circuit: &mut Circuit,
        params: &BTreeMap<String, Expr>,
        bindings: Option<&BTreeMap<String, Expr>>,
        warnings: &mut Vec<String>,
    ) -> Result<Response> {
        if self.instruction.data_type == DataType::DcVar {
            let injected = noise::inject_dcvar_sources(circuit, params, self.instruction.is_numeric(), self.config, self.backend)?;
            warnings.extend(injected);
        }
        let derivation = self.derive(circuit, params, warnings)?;
        self.finish(&derivation, bindings, warnings)
    }
}

fn failed_step(index: usize, err: SymnaError, warnings: &mut Vec<String>) -> Response {
    let msg = format!("step {}: {}", index + 1, err);
    warn!("{}", msg);
    warnings.push(msg);
    Response::Failed(err.to_string())
}

/// Execute one instruction.
///
/// Refuses circuits with recorded or detected structural errors. `dcvar`
/// instructions inject synthetic resistor-variance sources into `circuit`;
/// every other data type leaves it unchanged.
pub fn execute(
    circuit: &mut Circuit,
    instruction: &Instruction,
    config: &AnalysisConfig,
    backend: &dyn SymbolicBackend,
) -> Result<AnalysisResult> {
    if circuit.error_count() > 0 {
        for err in &circuit.errors {
            warn!(%err, "circuit error");
        }
        return Err(SymnaError::CircuitErrors {
            count: circuit.error_count(),
        });
    }
    let problems = validate_circuit(circuit, config);
    if !problems.is_empty() {
        for problem in &problems {
            warn!(%problem, "circuit check failed");
        }
        return Err(SymnaError::CircuitErrors { count: problems.len() });
    }
    instruction.validate()?;

    info!(
        data_type = %instruction.data_type,
        gain_type = %instruction.gain_type,
        stepped = instruction.step.is_some(),
        "executing instruction"
    );

    let analysis = Analysis {
        instruction,
        config,
        backend,
    };
    let mut warnings = Vec::new();

    let Some(step) = &instruction.step else {
        let params = circuit.params.clone();
        let response = analysis.run(circuit, &params, None, &mut warnings)?;
        return Ok(AnalysisResult {
            data_type: instruction.data_type,
            gain_type: instruction.gain_type,
            steps: Vec::new(),
            responses: vec![response],
            warnings,
        });
    };

    let steps = step.bindings()?;
    let mut responses = Vec::with_capacity(steps.len());

    if config.step_function && instruction.data_type != DataType::DcVar {
        let mut params = circuit.params.clone();
        for var in step.vars() {
            params.remove(var);
        }
        let derivation = analysis.derive(circuit, &params, &mut warnings)?;
        for (i, values) in steps.iter().enumerate() {
            let bindings = as_exprs(values);
            let response = analysis
                .finish(&derivation, Some(&bindings), &mut warnings)
                .unwrap_or_else(|err| failed_step(i, err, &mut warnings));
            responses.push(response);
        }
    } else {
        for (i, values) in steps.iter().enumerate() {
            let bindings = as_exprs(values);
            let mut params = circuit.params.clone();
            params.extend(bindings.iter().map(|(k, v)| (k.clone(), v.clone())));
            let response = analysis
                .run(circuit, &params, Some(&bindings), &mut warnings)
                .unwrap_or_else(|err| failed_step(i, err, &mut warnings));
            responses.push(response);
        }
    }
    debug!(steps = responses.len(), "stepping finished");

    Ok(AnalysisResult {
        data_type: instruction.data_type,
        gain_type: instruction.gain_type,
        steps,
        responses,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cas::NativeBackend;
    use crate::circuit::{param, Element, Model};
    use approx::assert_relative_eq;

    fn divider() -> Circuit {
        let mut c = Circuit::new("divider");
        c.add_element(
            Element::new("V1", Model::VoltageSource, &["in", "0"])
                .with_value(Expr::one())
                .with_param(param::DC, Expr::constant(10.0)),
        );
        c.add_element(Element::new("R1", Model::Resistor, &["in", "out"]));
        c.add_element(Element::new("R2", Model::Resistor, &["out", "0"]));
        c
    }

    fn at(e: &Expr, values: &[(&str, f64)]) -> f64 {
        let bindings: BTreeMap<String, f64> = values.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        e.eval(&bindings).unwrap()
    }

    fn gain(data_type: DataType) -> Instruction {
        Instruction::new(data_type, GainType::Gain)
            .with_source("V1")
            .with_detector(Detector::single("V_out"))
    }

    #[test]
    fn test_divider_dc_transfer_is_symbolic() {
        let mut c = divider();
        let config = AnalysisConfig::default();
        let backend = NativeBackend::new();
        let result = execute(&mut c, &gain(DataType::Dc), &config, &backend).unwrap();
        let Some(Response::Dc(dc)) = result.response() else {
            panic!("expected a dc response, got {:?}", result.response());
        };
        let dc = dc.value().unwrap();
        assert_relative_eq!(at(dc, &[("R1", 1.0), ("R2", 3.0)]), 0.75, max_relative = 1e-12);
        assert!(!result.is_stepped());
    }

    #[test]
    fn test_divider_has_no_poles_or_zeros() {
        let mut c = divider();
        c.define_param("R1", Expr::constant(1e3));
        c.define_param("R2", Expr::constant(1e3));
        let config = AnalysisConfig::default();
        let backend = NativeBackend::new();
        let result = execute(&mut c, &gain(DataType::Pz), &config, &backend).unwrap();
        let Some(Response::Pz { poles, zeros, dc_value }) = result.response() else {
            panic!("expected a pz response");
        };
        assert!(poles.is_empty());
        assert!(zeros.is_empty());
        assert_relative_eq!(dc_value.value().unwrap().as_f64().unwrap(), 0.5, max_relative = 1e-12);
    }

    #[test]
    fn test_rc_pole_in_hz() {
        let mut c = divider();
        c.remove_element("R2");
        c.add_element(Element::new("C1", Model::Capacitor, &["out", "0"]).with_value(Expr::constant(1e-6)));
        c.define_param("R1", Expr::constant(1e3));
        let config = AnalysisConfig::default();
        let backend = NativeBackend::new();
        let result = execute(&mut c, &gain(DataType::Poles), &config, &backend).unwrap();
        let Some(Response::Poles(poles)) = result.response() else {
            panic!("expected poles");
        };
        assert_eq!(poles.len(), 1);
        assert_relative_eq!(poles[0].re, -1e3 / (2.0 * std::f64::consts::PI), max_relative = 1e-9);
    }

    fn amplifier() -> Circuit {
        let mut c = Circuit::new("amplifier");
        c.add_element(Element::new("V1", Model::VoltageSource, &["in", "0"]).with_value(Expr::one()));
        c.add_element(Element::new("E1", Model::Vcvs, &["out", "0", "in", "fb"]).with_value(Expr::symbol("A")));
        c.add_element(Element::new("R1", Model::Resistor, &["out", "fb"]));
        c.add_element(Element::new("R2", Model::Resistor, &["fb", "0"]));
        c
    }

    fn laplace_expr(result: &AnalysisResult) -> Expr {
        match result.response() {
            Some(Response::Laplace(l)) => l.expr.clone(),
            other => panic!("expected a laplace response, got {:?}", other),
        }
    }

    #[test]
    fn test_loop_gain_types_leave_reference_untouched() {
        let mut c = amplifier();
        let before = c.element("E1").unwrap().clone();
        let config = AnalysisConfig::default();
        let backend = NativeBackend::new();
        let values = [("A", 10.0), ("R1", 1.0), ("R2", 1.0)];

        let lg = Instruction::new(DataType::Laplace, GainType::LoopGain).with_lg_ref("E1");
        let l = laplace_expr(&execute(&mut c, &lg, &config, &backend).unwrap());
        assert_relative_eq!(at(&l, &values), -5.0, max_relative = 1e-12);
        assert_eq!(c.element("E1").unwrap(), &before);

        let servo = Instruction { gain_type: GainType::Servo, ..lg.clone() };
        let sv = laplace_expr(&execute(&mut c, &servo, &config, &backend).unwrap());
        assert_relative_eq!(at(&sv, &values), 5.0 / 6.0, max_relative = 1e-12);

        let asymptotic = gain(DataType::Laplace).with_lg_ref("E1");
        let asymptotic = Instruction { gain_type: GainType::Asymptotic, ..asymptotic };
        let a = laplace_expr(&execute(&mut c, &asymptotic, &config, &backend).unwrap());
        assert_relative_eq!(at(&a, &values), 2.0, max_relative = 1e-12);

        let direct = Instruction { gain_type: GainType::Direct, ..asymptotic };
        let d = laplace_expr(&execute(&mut c, &direct, &config, &backend).unwrap());
        assert_relative_eq!(at(&d, &values), 0.0, epsilon = 1e-12);

        let g = laplace_expr(&execute(&mut c, &gain(DataType::Laplace), &config, &backend).unwrap());
        assert_relative_eq!(at(&g, &values), 10.0 / 6.0, max_relative = 1e-12);
        assert_eq!(c.element("E1").unwrap(), &before);
    }

    #[test]
    fn test_stepping_modes_agree() {
        let mut c = divider();
        c.define_param("R1", Expr::constant(1e3));
        c.define_param("R2", Expr::symbol("Rb"));
        c.define_param("Rb", Expr::constant(1e3));
        let backend = NativeBackend::new();
        let ins = gain(DataType::Dc)
            .with_numeric(true)
            .with_step(StepSpec::list("Rb", vec![1e3, 3e3]));

        for step_function in [true, false] {
            let config = AnalysisConfig::default().with_step_function(step_function);
            let result = execute(&mut c, &ins, &config, &backend).unwrap();
            assert!(result.is_stepped());
            assert_eq!(result.steps.len(), 2);
            let values: Vec<f64> = result
                .responses
                .iter()
                .map(|r| match r {
                    Response::Dc(d) => d.value().unwrap().as_f64().unwrap(),
                    other => panic!("expected dc, got {:?}", other),
                })
                .collect();
            assert_relative_eq!(values[0], 0.5, max_relative = 1e-12);
            assert_relative_eq!(values[1], 0.75, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_stepping_symbolic_circuit_in_rebuild_mode() {
        let mut c = divider();
        let config = AnalysisConfig::default().with_step_function(false);
        let backend = NativeBackend::new();
        let ins = gain(DataType::Dc).with_step(
            StepSpec::array(
                vec!["R1".to_string(), "R2".to_string()],
                vec![vec![1.0, 1.0], vec![1.0, 3.0]],
            )
            .unwrap(),
        );
        let result = execute(&mut c, &ins, &config, &backend).unwrap();
        let last = match &result.responses[1] {
            Response::Dc(d) => d.value().unwrap().as_f64().unwrap(),
            other => panic!("expected dc, got {:?}", other),
        };
        assert_relative_eq!(last, 0.75, max_relative = 1e-12);
    }

    #[test]
    fn test_dcvar_end_to_end() {
        let mut c = divider();
        c.define_param("R1", Expr::constant(1e3));
        c.define_param("R2", Expr::constant(1e3));
        c.elements
            .get_mut("R1")
            .unwrap()
            .params
            .insert(param::DCVAR.to_string(), Expr::constant(1e-4));
        let config = AnalysisConfig::default();
        let backend = NativeBackend::new();
        let ins = gain(DataType::DcVar).with_numeric(true);

        for _ in 0..2 {
            let result = execute(&mut c, &ins, &config, &backend).unwrap();
            let Some(Response::DcVar(var)) = result.response() else {
                panic!("expected a dcvar response");
            };
            assert_relative_eq!(var.onoise.as_f64().unwrap(), 6.25e-10, max_relative = 1e-9);
        }
        let synthetic = c
            .elements
            .keys()
            .filter(|k| k.starts_with(noise::DCVAR_SOURCE_PREFIX))
            .count();
        assert_eq!(synthetic, 1);
    }

    #[test]
    fn test_matrix_and_refusals() {
        let mut c = divider();
        let config = AnalysisConfig::default();
        let backend = NativeBackend::new();
        let result = execute(&mut c, &Instruction::new(DataType::Matrix, GainType::Gain), &config, &backend).unwrap();
        let Some(Response::Matrix { matrix, dv, iv }) = result.response() else {
            panic!("expected a matrix");
        };
        assert_eq!(dv, &vec!["V_in".to_string(), "V_out".to_string(), "I_V1".to_string()]);
        assert_eq!(matrix.rows(), 3);
        assert!(iv[2].is_one());

        let missing_source = Instruction::new(DataType::Laplace, GainType::Gain).with_detector(Detector::single("V_out"));
        assert!(matches!(
            execute(&mut c, &missing_source, &config, &backend),
            Err(SymnaError::InvalidInstruction { .. })
        ));

        c.add_element(Element::new("R1", Model::Resistor, &["in", "0"]));
        assert!(matches!(
            execute(&mut c, &gain(DataType::Dc), &config, &backend),
            Err(SymnaError::CircuitErrors { count: 1 })
        ));
    }
}
