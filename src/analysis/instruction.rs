//! Analysis requests.

use std::fmt;
use std::str::FromStr;

use super::stepping::StepSpec;
use crate::circuit::{Branch, GROUND_VAR};
use crate::error::{Result, SymnaError};

/// Kind of result requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// MNA matrix, dependent and independent vectors
    Matrix,
    /// Poles of the transfer
    Poles,
    /// Zeros of the transfer
    Zeros,
    /// Poles, zeros and DC value after cancellation
    Pz,
    /// Denominator of the transfer
    Denom,
    /// Numerator of the transfer
    Numer,
    /// Transfer as a rational function of the Laplace variable
    Laplace,
    /// Network solution `M⁻¹ · Iv`
    Solve,
    /// Output and input referred noise spectra
    Noise,
    /// Transfer at `s = 0`
    Dc,
    /// DC network solution
    DcSolve,
    /// DC variance
    DcVar,
    /// Unit step response
    Step,
    /// Unit impulse response
    Impulse,
    /// Time response of a `vi` transfer
    Time,
}

impl DataType {
    /// Every data type.
    pub const ALL: [DataType; 15] = [
        DataType::Matrix,
        DataType::Poles,
        DataType::Zeros,
        DataType::Pz,
        DataType::Denom,
        DataType::Numer,
        DataType::Laplace,
        DataType::Solve,
        DataType::Noise,
        DataType::Dc,
        DataType::DcSolve,
        DataType::DcVar,
        DataType::Step,
        DataType::Impulse,
        DataType::Time,
    ];

    /// Name used in instructions and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Matrix => "matrix",
            DataType::Poles => "poles",
            DataType::Zeros => "zeros",
            DataType::Pz => "pz",
            DataType::Denom => "denom",
            DataType::Numer => "numer",
            DataType::Laplace => "laplace",
            DataType::Solve => "solve",
            DataType::Noise => "noise",
            DataType::Dc => "dc",
            DataType::DcSolve => "dcsolve",
            DataType::DcVar => "dcvar",
            DataType::Step => "step",
            DataType::Impulse => "impulse",
            DataType::Time => "time",
        }
    }

    /// Root finding needs numeric coefficients.
    pub fn requires_numeric(&self) -> bool {
        matches!(self, DataType::Poles | DataType::Zeros | DataType::Pz)
    }

    /// Results that depend on a source/detector transfer.
    fn needs_transfer(&self) -> bool {
        matches!(
            self,
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
}

/// Interpretation of "transfer function".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GainType {
    /// Source to detector gain of the circuit as is
    #[default]
    Gain,
    /// Gain with the loop-gain reference replaced by a nullor
    Asymptotic,
    /// Gain with the loop-gain reference set to zero
    Direct,
    /// Loop gain at the loop-gain reference
    LoopGain,
    /// `-L / (1 - L)`
    Servo,
    /// Detector response to all sources with their own values
    Vi,
}

impl GainType {
    /// Every gain type.
    pub const ALL: [GainType; 6] = [
        GainType::Gain,
        GainType::Asymptotic,
        GainType::Direct,
        GainType::LoopGain,
        GainType::Servo,
        GainType::Vi,
    ];

    /// Name used in instructions and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            GainType::Gain => "gain",
            GainType::Asymptotic => "asymptotic",
            GainType::Direct => "direct",
            GainType::LoopGain => "loopgain",
            GainType::Servo => "servo",
            GainType::Vi => "vi",
        }
    }

    /// True when the gain type modifies or probes the loop-gain reference.
    pub fn uses_loop_gain_reference(&self) -> bool {
        matches!(
            self,
            GainType::Asymptotic | GainType::Direct | GainType::LoopGain | GainType::Servo
        )
    }

    /// True when source and detector positions follow from the loop-gain
    /// reference instead of the instruction.
    pub fn is_loop_type(&self) -> bool {
        matches!(self, GainType::LoopGain | GainType::Servo)
    }
}

macro_rules! impl_named_enum {
    ($ty:ident, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $ty {
            type Err = SymnaError;

            fn from_str(s: &str) -> Result<Self> {
                let lower = s.to_ascii_lowercase();
                $ty::ALL
                    .iter()
                    .copied()
                    .find(|v| v.name() == lower)
                    .ok_or_else(|| SymnaError::invalid_instruction(format!("unknown {} '{}'", $what, s)))
            }
        }
    };
}

impl_named_enum!(DataType, "data type");
impl_named_enum!(GainType, "gain type");

/// Detected quantity: a node-voltage pair or a branch-current pair, named
/// by dependent variables. A missing side is ground (or no current).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detector {
    /// Positive side
    pub pos: Option<String>,
    /// Negative side
    pub neg: Option<String>,
}

impl Detector {
    /// Single-ended detector.
    pub fn single(var: impl Into<String>) -> Self {
        Self {
            pos: Some(var.into()),
            neg: None,
        }
    }

    /// Differential detector.
    pub fn pair(pos: impl Into<String>, neg: impl Into<String>) -> Self {
        Self {
            pos: Some(pos.into()),
            neg: Some(neg.into()),
        }
    }

    /// Parse `V_out`, `V_out,V_ref` or `I_V1`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = text.split(',').map(str::trim).filter(|p| !p.is_empty());
        let pos = parts.next().map(str::to_string);
        let neg = parts.next().map(str::to_string);
        if parts.next().is_some() {
            return Err(SymnaError::invalid_instruction(format!(
                "detector '{}' has more than two parts",
                text
            )));
        }
        let detector = Self { pos, neg };
        detector.validate()?;
        Ok(detector)
    }

    fn is_current(name: &str) -> bool {
        [Branch::Through, Branch::Output, Branch::Input]
            .iter()
            .any(|b| name.starts_with(&format!("{}_", b.prefix())))
    }

    /// Both sides must be voltages or both currents.
    pub fn validate(&self) -> Result<()> {
        let names: Vec<&String> = self.pos.iter().chain(self.neg.iter()).collect();
        if names.is_empty() {
            return Err(SymnaError::invalid_instruction("empty detector"));
        }
        let currents = names.iter().filter(|n| Self::is_current(n)).count();
        let voltages = names.iter().filter(|n| n.starts_with("V_")).count();
        if currents + voltages != names.len() || (currents > 0 && voltages > 0) {
            return Err(SymnaError::invalid_instruction(format!(
                "detector must be a voltage pair or a current pair: {}",
                self
            )));
        }
        Ok(())
    }

    /// Sides as (name, sign), ground voltage dropped.
    pub fn sides(&self) -> impl Iterator<Item = (&str, f64)> {
        self.pos
            .iter()
            .map(|p| (p.as_str(), 1.0))
            .chain(self.neg.iter().map(|n| (n.as_str(), -1.0)))
            .filter(|(name, _)| *name != GROUND_VAR)
    }
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.pos, &self.neg) {
            (Some(p), Some(n)) => write!(f, "{} - {}", p, n),
            (Some(p), None) => write!(f, "{}", p),
            (None, Some(n)) => write!(f, "-{}", n),
            (None, None) => Ok(()),
        }
    }
}

/// One analysis request. Immutable; results are returned separately.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Requested result
    pub data_type: DataType,
    /// Transfer interpretation
    pub gain_type: GainType,
    /// Independent source designator
    pub source: Option<String>,
    /// Detector
    pub detector: Option<Detector>,
    /// Loop-gain reference designator
    pub lg_ref: Option<String>,
    /// Parameter stepping
    pub step: Option<StepSpec>,
    /// Substitute parameter definitions before the analysis
    pub numeric: bool,
}

impl Instruction {
    /// Request `data_type` with `gain_type`.
    pub fn new(data_type: DataType, gain_type: GainType) -> Self {
        Self {
            data_type,
            gain_type,
            source: None,
            detector: None,
            lg_ref: None,
            step: None,
            numeric: false,
        }
    }

    /// Set the independent source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the detector.
    pub fn with_detector(mut self, detector: Detector) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Set the loop-gain reference.
    pub fn with_lg_ref(mut self, lg_ref: impl Into<String>) -> Self {
        self.lg_ref = Some(lg_ref.into());
        self
    }

    /// Set parameter stepping.
    pub fn with_step(mut self, step: StepSpec) -> Self {
        self.step = Some(step);
        self
    }

    /// Request numeric parameter substitution.
    pub fn with_numeric(mut self, numeric: bool) -> Self {
        self.numeric = numeric;
        self
    }

    /// Numeric substitution requested or required by the data type.
    pub fn is_numeric(&self) -> bool {
        self.numeric || self.data_type.requires_numeric()
    }

    /// Check that the request names everything its data and gain type need.
    pub fn validate(&self) -> Result<()> {
        if self.gain_type.uses_loop_gain_reference() && self.lg_ref.is_none() {
            return Err(SymnaError::invalid_instruction(format!(
                "gain type '{}' requires a loop-gain reference",
                self.gain_type
            )));
        }

        match self.data_type {
            DataType::Noise | DataType::DcVar => {
                if self.gain_type != GainType::Gain {
                    return Err(SymnaError::invalid_instruction(format!(
                        "{} analysis requires gain type 'gain', got '{}'",
                        self.data_type, self.gain_type
                    )));
                }
                self.require_detector()?;
            }
            dt if dt.needs_transfer() => match self.gain_type {
                GainType::LoopGain | GainType::Servo => {}
                GainType::Vi => self.require_detector()?,
                _ => {
                    self.require_detector()?;
                    if self.source.is_none() {
                        return Err(SymnaError::invalid_instruction(format!(
                            "{} with gain type '{}' requires a source",
                            self.data_type, self.gain_type
                        )));
                    }
                }
            },
            _ => {}
        }

        if let Some(detector) = &self.detector {
            detector.validate()?;
        }
        if let Some(step) = &self.step {
            step.validate()?;
        }
        Ok(())
    }

    fn require_detector(&self) -> Result<()> {
        if self.detector.is_none() {
            return Err(SymnaError::invalid_instruction(format!(
                "{} requires a detector",
                self.data_type
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for dt in DataType::ALL {
            assert_eq!(dt.name().parse::<DataType>().unwrap(), dt);
        }
        assert_eq!("LoopGain".parse::<GainType>().unwrap(), GainType::LoopGain);
        assert!("bode".parse::<DataType>().is_err());
    }

    #[test]
    fn test_detector_parse() {
        let d = Detector::parse("V_out, V_ref").unwrap();
        assert_eq!(d, Detector::pair("V_out", "V_ref"));
        assert!(Detector::parse("I_V1").is_ok());
        assert!(Detector::parse("Io_H1,Ii_H1").is_ok());
        assert!(Detector::parse("V_out,I_V1").is_err());
        assert!(Detector::parse("out").is_err());
        let grounded = Detector::pair("V_out", "V_0");
        let sides: Vec<_> = grounded.sides().collect();
        assert_eq!(sides, vec![("V_out", 1.0)]);
    }

    #[test]
    fn test_validate_requirements() {
        let gain = Instruction::new(DataType::Laplace, GainType::Gain);
        assert!(gain.validate().is_err());
        assert!(gain
            .clone()
            .with_source("V1")
            .with_detector(Detector::single("V_out"))
            .validate()
            .is_ok());

        let lg = Instruction::new(DataType::Laplace, GainType::LoopGain);
        assert!(lg.validate().is_err());
        assert!(lg.with_lg_ref("E1").validate().is_ok());

        let noise = Instruction::new(DataType::Noise, GainType::Vi).with_detector(Detector::single("V_out"));
        assert!(noise.validate().is_err());

        assert!(Instruction::new(DataType::Matrix, GainType::Gain).validate().is_ok());
        assert!(Instruction::new(DataType::Poles, GainType::Gain).is_numeric());
    }
}
