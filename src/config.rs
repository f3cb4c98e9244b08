//! Analysis configuration.
//!
//! Every builder and analyzer receives an [`AnalysisConfig`] explicitly;
//! nothing in the engine reads process-wide settings.

use std::time::Duration;

/// Default maximum number of recursive parameter substitution passes.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 10;

/// Default relative tolerance for pole/zero cancellation.
pub const DEFAULT_PZ_CANCEL_TOLERANCE: f64 = 1e-6;

/// Default timeout for one call into the external CAS.
pub const DEFAULT_CAS_TIMEOUT: Duration = Duration::from_secs(30);

/// Algorithm used to compute symbolic determinants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeterminantMethod {
    /// Recursive expansion by minors along the first row, skipping zeros.
    #[default]
    Minors,
    /// Fraction-free Gaussian elimination.
    Bareiss,
    /// Delegate to the symbolic backend; falls back to `Minors` on failure.
    Backend,
}

/// Order in which factoring and simplification are applied to Laplace results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimplifyOrder {
    /// Cancel common factors first, then factor into poles and zeros.
    #[default]
    SimplifyThenFactor,
    /// Factor into poles and zeros first, then cancel coinciding pairs.
    FactorThenSimplify,
}

/// Post-processing applied to `laplace` results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaplaceOptions {
    /// Rewrite as `gain * s^l * (1 + b1*s + ...) / (1 + a1*s + ...)`.
    pub normalize: bool,
    /// Factor numeric results into gain, zeros and poles.
    pub factor: bool,
    /// Cancel common factors (exact cancellation, or pole/zero pairs once factored).
    pub simplify: bool,
    /// Composition order when both `factor` and `simplify` are set.
    pub order: SimplifyOrder,
}

impl Default for LaplaceOptions {
    fn default() -> Self {
        Self {
            normalize: true,
            factor: false,
            simplify: true,
            order: SimplifyOrder::default(),
        }
    }
}

/// Configuration context for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Name of the Laplace variable.
    pub laplace: String,
    /// Name of the frequency variable used in noise densities (Hz).
    pub frequency: String,
    /// Name of the time variable used in time-domain responses.
    pub time: String,
    /// Maximum number of recursive substitution passes over parameter definitions.
    pub max_recursion_depth: usize,
    /// Relative tolerance for pole/zero cancellation.
    pub pz_cancel_tolerance: f64,
    /// Step by substituting into an already derived function instead of
    /// rebuilding the matrix for every step.
    pub step_function: bool,
    /// Determinant algorithm.
    pub determinant_method: DeterminantMethod,
    /// Laplace result post-processing.
    pub laplace_options: LaplaceOptions,
    /// Report root and servo frequencies in Hz instead of rad/s.
    pub hz: bool,
    /// Timeout for one external CAS call.
    pub cas_timeout: Duration,
    /// Command used to launch Maxima.
    pub maxima_command: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            laplace: "s".to_string(),
            frequency: "f".to_string(),
            time: "t".to_string(),
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            pz_cancel_tolerance: DEFAULT_PZ_CANCEL_TOLERANCE,
            step_function: true,
            determinant_method: DeterminantMethod::default(),
            laplace_options: LaplaceOptions::default(),
            hz: true,
            cas_timeout: DEFAULT_CAS_TIMEOUT,
            maxima_command: "maxima".to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Laplace variable name.
    pub fn with_laplace(mut self, name: impl Into<String>) -> Self {
        self.laplace = name.into();
        self
    }

    /// Set the maximum recursive substitution depth.
    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    /// Set the relative pole/zero cancellation tolerance.
    pub fn with_pz_cancel_tolerance(mut self, tolerance: f64) -> Self {
        self.pz_cancel_tolerance = tolerance;
        self
    }

    /// Choose between substitution stepping (`true`) and rebuild stepping.
    pub fn with_step_function(mut self, enabled: bool) -> Self {
        self.step_function = enabled;
        self
    }

    /// Set the determinant algorithm.
    pub fn with_determinant_method(mut self, method: DeterminantMethod) -> Self {
        self.determinant_method = method;
        self
    }

    /// Set Laplace post-processing options.
    pub fn with_laplace_options(mut self, options: LaplaceOptions) -> Self {
        self.laplace_options = options;
        self
    }

    /// Report frequencies in Hz (`true`) or rad/s (`false`).
    pub fn with_hz(mut self, hz: bool) -> Self {
        self.hz = hz;
        self
    }

    /// Set the timeout of one external CAS call.
    pub fn with_cas_timeout(mut self, timeout: Duration) -> Self {
        self.cas_timeout = timeout;
        self
    }

    /// Set the command used to launch Maxima.
    pub fn with_maxima_command(mut self, command: impl Into<String>) -> Self {
        self.maxima_command = command.into();
        self
    }

    /// Convert an angular frequency to the configured reporting unit.
    pub fn report_frequency(&self, omega: f64) -> f64 {
        if self.hz {
            omega / (2.0 * std::f64::consts::PI)
        } else {
            omega
        }
    }
}
