//! Noise spectra and DC variance.
//!
//! Every independent source with a nonzero `noise` (or `dcvar`) parameter
//! contributes its weight times the squared magnitude of its transfer to
//! the detector. Resistor mismatch enters the variance analysis through
//! synthetic current sources injected in parallel with each resistor
//! carrying a `dcvar` parameter.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use tracing::{debug, info, warn};

use super::instruction::{Detector, Instruction};
use super::positions::{detector_positions, source_positions, Positions};
use super::transfer::{solve_system, zero_frequency_value, Determinants};
use crate::cas::SymbolicBackend;
use crate::circuit::{branch_var, node_var, param, Branch, Circuit, Element, Model};
use crate::config::AnalysisConfig;
use crate::error::{Result, SymnaError};
use crate::solver::{MatrixBuilder, MnaSystem, SourceParam};
use crate::symbolic::Expr;

/// Designator prefix of the synthetic resistor-variance sources.
pub const DCVAR_SOURCE_PREFIX: &str = "Idcvar_";

/// Output and source-referred noise (or variance) with per-source terms.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseResult {
    /// Total detector noise density (or variance)
    pub onoise: Expr,
    /// Total noise referred to the instruction's source
    pub inoise: Option<Expr>,
    /// Contribution of each source to `onoise`
    pub onoise_terms: BTreeMap<String, Expr>,
    /// Contribution of each source to `inoise`
    pub inoise_terms: BTreeMap<String, Expr>,
    /// True for a DC variance result (no frequency dependence)
    pub is_variance: bool,
}

impl NoiseResult {
    /// Designators of the contributing sources.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.onoise_terms.keys().map(String::as_str)
    }

    /// Substitute values into every expression.
    pub fn substitute(&self, bindings: &BTreeMap<String, Expr>) -> NoiseResult {
        let map = |terms: &BTreeMap<String, Expr>| {
            terms
                .iter()
                .map(|(k, v)| (k.clone(), v.substitute_all(bindings)))
                .collect()
        };
        NoiseResult {
            onoise: self.onoise.substitute_all(bindings),
            inoise: self.inoise.as_ref().map(|e| e.substitute_all(bindings)),
            onoise_terms: map(&self.onoise_terms),
            inoise_terms: map(&self.inoise_terms),
            is_variance: self.is_variance,
        }
    }
}

/// Selects output or source-referred noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseKind {
    /// Noise at the detector
    Output,
    /// Noise referred to the source
    Input,
}

/// Transfers from independent sources to one detector.
struct SourceGains<'s> {
    sys: &'s MnaSystem,
    dets: &'s Determinants<'s>,
    det: Expr,
    det_pos: Option<usize>,
    det_neg: Option<usize>,
}

impl<'s> SourceGains<'s> {
    fn new(sys: &'s MnaSystem, dets: &'s Determinants<'s>, detector: &Detector) -> Result<Self> {
        let (det_pos, det_neg) = detector_positions(sys, detector)?;
        Ok(Self {
            sys,
            dets,
            det: dets.det(&sys.matrix),
            det_pos,
            det_neg,
        })
    }

    fn gain(&self, source: &Element) -> Result<Expr> {
        let (src_pos, src_neg) = source_positions(self.sys, source)?;
        let positions = Positions {
            src_pos,
            src_neg,
            det_pos: self.det_pos,
            det_neg: self.det_neg,
        };
        Ok(self.dets.cofactor_sum(&self.sys.matrix, &positions) / &self.det)
    }
}

fn require_detector(instruction: &Instruction) -> Result<&Detector> {
    instruction
        .detector
        .as_ref()
        .ok_or_else(|| SymnaError::invalid_instruction("noise analysis needs a detector"))
}

fn named_source<'e>(builder: &'e MatrixBuilder<'_>, name: &str) -> Result<&'e Element> {
    builder
        .effective_elements()
        .find(|e| e.refdes == name && e.model.is_independent_source())
        .ok_or_else(|| SymnaError::UnknownSource { name: name.to_string() })
}

/// Split totals into the referred version using the source's gain.
fn refer_to_source(
    onoise_terms: &BTreeMap<String, Expr>,
    source_gain_sq: &Expr,
    source: &str,
    warnings: &mut Vec<String>,
) -> Option<BTreeMap<String, Expr>> {
    if source_gain_sq.is_zero() {
        let msg = format!("{}: zero transfer to the detector, source-referred noise undefined", source);
        warn!("{}", msg);
        warnings.push(msg);
        return None;
    }
    Some(
        onoise_terms
            .iter()
            .map(|(k, v)| (k.clone(), v / source_gain_sq))
            .collect(),
    )
}

fn finish(
    onoise_terms: BTreeMap<String, Expr>,
    inoise_terms: Option<BTreeMap<String, Expr>>,
    is_variance: bool,
) -> NoiseResult {
    let onoise = onoise_terms.values().cloned().sum();
    let inoise = inoise_terms.as_ref().map(|t| t.values().cloned().sum());
    NoiseResult {
        onoise,
        inoise,
        onoise_terms,
        inoise_terms: inoise_terms.unwrap_or_default(),
        is_variance,
    }
}

/// Noise spectral densities as functions of the frequency symbol (Hz).
pub fn noise(
    sys: &MnaSystem,
    builder: &MatrixBuilder<'_>,
    instruction: &Instruction,
    dets: &Determinants<'_>,
    config: &AnalysisConfig,
    warnings: &mut Vec<String>,
) -> Result<NoiseResult> {
    let detector = require_detector(instruction)?;
    let gains = SourceGains::new(sys, dets, detector)?;
    let s = config.laplace.as_str();
    let omega = Expr::constant(2.0 * PI) * Expr::symbol(&config.frequency);

    let mut terms = BTreeMap::new();
    for source in builder.effective_elements().filter(|e| e.model.is_independent_source()) {
        let density = builder.resolved_param(source, param::NOISE, warnings);
        if density.is_zero() {
            continue;
        }
        let gain = gains.gain(source)?;
        terms.insert(source.refdes.clone(), gain.magnitude_squared_jw(s, &omega) * density);
    }
    debug!(sources = terms.len(), "noise contributions");

    let referred = match &instruction.source {
        Some(name) => {
            let gain_sq = gains.gain(named_source(builder, name)?)?.magnitude_squared_jw(s, &omega);
            refer_to_source(&terms, &gain_sq, name, warnings)
        }
        None => None,
    };
    Ok(finish(terms, referred, false))
}

/// DC variance at the detector from every source with a `dcvar` parameter.
pub fn dc_variance(
    sys: &MnaSystem,
    builder: &MatrixBuilder<'_>,
    instruction: &Instruction,
    dets: &Determinants<'_>,
    config: &AnalysisConfig,
    backend: &dyn SymbolicBackend,
    warnings: &mut Vec<String>,
) -> Result<NoiseResult> {
    let detector = require_detector(instruction)?;
    let gains = SourceGains::new(sys, dets, detector)?;
    let s = config.laplace.as_str();
    let dc_gain = |source: &Element| -> Result<Option<Expr>> {
        let gain = gains.gain(source)?;
        Ok(zero_frequency_value(&gain, s, backend).into_value())
    };

    let mut terms = BTreeMap::new();
    for source in builder.effective_elements().filter(|e| e.model.is_independent_source()) {
        let variance = builder.resolved_param(source, param::DCVAR, warnings);
        if variance.is_zero() {
            continue;
        }
        match dc_gain(source)? {
            Some(g) => {
                terms.insert(source.refdes.clone(), &g * &g * variance);
            }
            None => {
                let msg = format!("{}: DC transfer unavailable, contribution skipped", source.refdes);
                warn!("{}", msg);
                warnings.push(msg);
            }
        }
    }
    debug!(sources = terms.len(), "dc variance contributions");

    let referred = match &instruction.source {
        Some(name) => match dc_gain(named_source(builder, name)?)? {
            Some(g) => refer_to_source(&terms, &(&g * &g), name, warnings),
            None => None,
        },
        None => None,
    };
    Ok(finish(terms, referred, true))
}

/// Replace the synthetic variance sources of every resistor with a
/// `dcvar` parameter.
///
/// The DC operating point is solved with the sources' `dc` values; a
/// resistor `R` carrying current `I` gets a parallel current source with
/// `dcvar = dcvar_R / R² · I²`. Sources from a previous call are removed
/// first, so repeated calls leave one source per resistor.
pub fn inject_dcvar_sources(
    circuit: &mut Circuit,
    params: &BTreeMap<String, Expr>,
    numeric: bool,
    config: &AnalysisConfig,
    backend: &dyn SymbolicBackend,
) -> Result<Vec<String>> {
    let stale: Vec<String> = circuit
        .elements
        .keys()
        .filter(|k| k.starts_with(DCVAR_SOURCE_PREFIX))
        .cloned()
        .collect();
    for refdes in &stale {
        circuit.remove_element(refdes);
    }

    let mut warnings = Vec::new();
    let injected = {
        let builder = MatrixBuilder::new(circuit, config)
            .with_params(params)
            .numeric(numeric)
            .with_sources(SourceParam::Dc);

        let mut resistors = Vec::new();
        for el in circuit.elements.values() {
            if !matches!(el.model, Model::Resistor | Model::ResistorBranch) {
                continue;
            }
            let variance = builder.resolved_param(el, param::DCVAR, &mut warnings);
            if !variance.is_zero() {
                resistors.push((el, variance));
            }
        }
        if resistors.is_empty() {
            return Ok(warnings);
        }

        let sys = builder.build()?;
        warnings.extend(sys.warnings.iter().cloned());
        let dets = Determinants::new(config, backend);
        let solution = solve_system(&sys, &dets, backend)
            .into_value()
            .ok_or(SymnaError::SingularMatrix)?;
        let s = config.laplace.as_str();
        let operating_point = |var: &str| -> Result<Expr> {
            match sys.position(var)? {
                None => Ok(Expr::zero()),
                Some(i) => zero_frequency_value(&solution[i], s, backend)
                    .into_value()
                    .ok_or(SymnaError::SingularMatrix),
            }
        };

        let mut out = Vec::with_capacity(resistors.len());
        for (el, variance) in resistors {
            let resistance = builder.resolve(el, &el.value(), &mut warnings);
            let current = match el.model {
                Model::ResistorBranch => operating_point(&branch_var(Branch::Through, &el.refdes))?,
                _ => {
                    let v = operating_point(&node_var(&el.nodes[0]))? - operating_point(&node_var(&el.nodes[1]))?;
                    v / &resistance
                }
            };
            let weight = variance / (&resistance * &resistance) * &current * &current;
            let nodes = [el.nodes[0].as_str(), el.nodes[1].as_str()];
            out.push(
                Element::new(format!("{}{}", DCVAR_SOURCE_PREFIX, el.refdes), Model::CurrentSource, &nodes)
                    .with_value(Expr::zero())
                    .with_param(param::DCVAR, weight),
            );
        }
        out
    };

    info!(count = injected.len(), replaced = stale.len(), "injected resistor variance sources");
    for element in injected {
        circuit.add_element(element);
    }
    Ok(warnings)
}

/// RMS value of a noise result over `[fmin, fmax]` Hz.
///
/// With `source` set, only that source's term is integrated. A variance
/// result is already integrated; its square root is returned directly.
pub fn rms(
    result: &NoiseResult,
    kind: NoiseKind,
    fmin: f64,
    fmax: f64,
    source: Option<&str>,
    config: &AnalysisConfig,
    backend: &dyn SymbolicBackend,
) -> Result<f64> {
    let (total, terms) = match kind {
        NoiseKind::Output => (Some(&result.onoise), &result.onoise_terms),
        NoiseKind::Input => (result.inoise.as_ref(), &result.inoise_terms),
    };
    let density = match source {
        Some(name) => terms
            .get(name)
            .ok_or_else(|| SymnaError::UnknownSource { name: name.to_string() })?,
        None => total.ok_or_else(|| SymnaError::invalid_instruction("no source-referred noise in this result"))?,
    };
    let power = if result.is_variance {
        density.clone()
    } else {
        backend.integrate(density, &config.frequency, fmin, fmax)?
    };
    let value = power.as_f64().ok_or_else(|| SymnaError::NotNumeric {
        expr: power.to_string(),
    })?;
    Ok(value.sqrt())
}

#[cfg(test)]
mod tests {
    use super::super::{DataType, GainType};
    use super::*;
    use crate::cas::NativeBackend;
    use approx::assert_relative_eq;

    fn divider() -> Circuit {
        let mut c = Circuit::new("divider");
        c.add_element(
            Element::new("V1", Model::VoltageSource, &["in", "0"])
                .with_value(Expr::one())
                .with_param(param::DC, Expr::constant(10.0))
                .with_param(param::NOISE, Expr::constant(1e-8)),
        );
        c.add_element(Element::new("R1", Model::Resistor, &["in", "out"]).with_value(Expr::constant(1e3)));
        c.add_element(Element::new("R2", Model::Resistor, &["out", "0"]).with_value(Expr::constant(1e3)));
        c
    }

    fn instruction(data_type: DataType) -> Instruction {
        Instruction::new(data_type, GainType::Gain)
            .with_source("V1")
            .with_detector(Detector::single("V_out"))
    }

    #[test]
    fn test_white_noise_rms() {
        let c = divider();
        let config = AnalysisConfig::default();
        let backend = NativeBackend::new();
        let dets = Determinants::new(&config, &backend);
        let builder = MatrixBuilder::new(&c, &config);
        let sys = builder.build().unwrap();
        let mut warnings = Vec::new();
        let result = noise(&sys, &builder, &instruction(DataType::Noise), &dets, &config, &mut warnings).unwrap();

        assert_eq!(result.sources().collect::<Vec<_>>(), vec!["V1"]);
        assert_relative_eq!(result.onoise.as_f64().unwrap(), 2.5e-9, max_relative = 1e-9);
        assert_relative_eq!(result.inoise.as_ref().unwrap().as_f64().unwrap(), 1e-8, max_relative = 1e-9);

        let out = rms(&result, NoiseKind::Output, 10.0, 1010.0, None, &config, &backend).unwrap();
        assert_relative_eq!(out, (2.5e-9_f64 * 1000.0).sqrt(), max_relative = 1e-9);
        let inp = rms(&result, NoiseKind::Input, 10.0, 1010.0, Some("V1"), &config, &backend).unwrap();
        assert_relative_eq!(inp, (1e-8_f64 * 1000.0).sqrt(), max_relative = 1e-9);
        assert!(rms(&result, NoiseKind::Output, 10.0, 1010.0, Some("R1"), &config, &backend).is_err());
    }

    #[test]
    fn test_lowpass_noise_depends_on_frequency() {
        let mut c = divider();
        c.add_element(Element::new("C1", Model::Capacitor, &["out", "0"]).with_value(Expr::constant(1e-6)));
        let config = AnalysisConfig::default();
        let backend = NativeBackend::new();
        let dets = Determinants::new(&config, &backend);
        let builder = MatrixBuilder::new(&c, &config);
        let sys = builder.build().unwrap();
        let mut warnings = Vec::new();
        let result = noise(&sys, &builder, &instruction(DataType::Noise), &dets, &config, &mut warnings).unwrap();

        let at = |f: f64| result.onoise.substitute("f", &Expr::constant(f)).as_f64().unwrap();
        assert_relative_eq!(at(0.0), 2.5e-9, max_relative = 1e-9);
        assert!(at(1e4) < at(10.0));
    }

    #[test]
    fn test_dcvar_injection_is_idempotent_and_scaled() {
        let mut c = divider();
        c.elements
            .get_mut("R1")
            .unwrap()
            .params
            .insert(param::DCVAR.to_string(), Expr::constant(1e-4));
        let config = AnalysisConfig::default();
        let backend = NativeBackend::new();
        let params = c.params.clone();

        inject_dcvar_sources(&mut c, &params, true, &config, &backend).unwrap();
        inject_dcvar_sources(&mut c, &params, true, &config, &backend).unwrap();
        let synthetic: Vec<&String> = c.elements.keys().filter(|k| k.starts_with(DCVAR_SOURCE_PREFIX)).collect();
        assert_eq!(synthetic, vec!["Idcvar_R1"]);
        let weight = c.elements["Idcvar_R1"].param(param::DCVAR).unwrap().as_f64().unwrap();
        assert_relative_eq!(weight, 2.5e-15, max_relative = 1e-9);

        let dets = Determinants::new(&config, &backend);
        let builder = MatrixBuilder::new(&c, &config);
        let sys = builder.build().unwrap();
        let mut warnings = Vec::new();
        let result = dc_variance(
            &sys,
            &builder,
            &instruction(DataType::DcVar),
            &dets,
            &config,
            &backend,
            &mut warnings,
        )
        .unwrap();
        assert!(result.is_variance);
        assert_relative_eq!(result.onoise.as_f64().unwrap(), 6.25e-10, max_relative = 1e-9);
        let sigma = rms(&result, NoiseKind::Output, 0.0, 0.0, None, &config, &backend).unwrap();
        assert_relative_eq!(sigma, 2.5e-5, max_relative = 1e-9);
    }
}
