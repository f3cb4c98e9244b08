//! # Symna Core
//!
//! Symbolic small-signal analysis of linear(ized) electrical circuits.
//!
//! This library provides:
//! - A SPICE-like netlist language for expanded circuits
//! - Modified Nodal Analysis (MNA) with symbolic matrix entries
//! - Transfer functions for several gain definitions (gain, asymptotic,
//!   direct, loop gain, servo, detector response)
//! - Poles, zeros, DC values, network solutions, noise and DC variance,
//!   and time-domain responses, optionally over stepped parameters
//!
//! ## Architecture
//!
//! - [`symbolic`] - Polynomials, rational expressions and expression trees
//! - [`dsl`] - Parser for the netlist language
//! - [`circuit`] - Elements, circuit graph and validation
//! - [`solver`] - MNA assembly, determinants and root finding
//! - [`cas`] - Pluggable backends for limits, inverse Laplace transforms
//!   and integrals
//! - [`analysis`] - Instructions, execution and results
//!
//! ## Usage
//!
//! ```no_run
//! use symna_core::analysis::{execute, DataType, Detector, GainType, Instruction};
//! use symna_core::{cas::NativeBackend, dsl, AnalysisConfig};
//!
//! let mut circuit = dsl::load("V1 in 0 1\nR1 in out 1k\nC1 out 0 1u\n")?;
//! let instruction = Instruction::new(DataType::Laplace, GainType::Gain)
//!     .with_source("V1")
//!     .with_detector(Detector::single("V_out"));
//! let result = execute(&mut circuit, &instruction, &AnalysisConfig::default(), &NativeBackend::new())?;
//! println!("{}", result);
//! # Ok::<(), symna_core::SymnaError>(())
//! ```
//!
//! ## Analysis Method
//!
//! Every transfer is a ratio of determinants of the MNA matrix `M`:
//!
//! 1. Assemble `M`, the dependent variables `Dv` and the source vector `Iv`
//! 2. The denominator is `det(M)`
//! 3. The numerator is a signed sum of cofactors of the source rows and
//!    detector columns (or a Cramer determinant for detector responses)
//! 4. Numeric post-processing (roots, limits, integrals) runs on the
//!    resulting rational functions of the Laplace variable

pub mod analysis;
pub mod cas;
pub mod circuit;
pub mod config;
pub mod dsl;
pub mod error;
pub mod solver;
pub mod symbolic;

// Re-export main types for convenience
pub use analysis::{execute, AnalysisResult, Instruction, Response};
pub use circuit::Circuit;
pub use config::AnalysisConfig;
pub use error::{Result, SymnaError};
pub use symbolic::Expr;
