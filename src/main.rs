//! Symna - symbolic circuit analysis
//!
//! Runs one analysis instruction on a netlist and prints the result.
//!
//! # Usage
//!
//! ```bash
//! symna amp.cir --kind pz --source V1 --detector V_out
//! symna amp.cir --kind laplace --gain-type loopgain --lg-ref E1
//! symna amp.cir --kind dc --source V1 --detector V_out --step Rg=1k,2k,5k --numeric
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::warn;

use symna_core::{
    analysis::{execute, DataType, Detector, GainType, Instruction, StepSpec},
    cas::{MaximaBackend, NativeBackend, SymbolicBackend},
    dsl,
    error::{Result, SymnaError},
    symbolic::parse_value,
    AnalysisConfig, Circuit,
};

/// Symbolic small-signal circuit analysis
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the netlist file
    #[arg(value_name = "NETLIST")]
    netlist: PathBuf,

    /// Data type (matrix, poles, zeros, pz, denom, numer, laplace, solve,
    /// noise, dc, dcsolve, dcvar, step, impulse, time)
    #[arg(short, long, default_value = "laplace")]
    kind: String,

    /// Gain type (gain, asymptotic, direct, loopgain, servo, vi)
    #[arg(short, long, default_value = "gain")]
    gain_type: String,

    /// Independent source designator
    #[arg(short, long)]
    source: Option<String>,

    /// Detector, e.g. `V_out` or `V_out,V_ref`
    #[arg(short, long)]
    detector: Option<String>,

    /// Loop-gain reference designator
    #[arg(long)]
    lg_ref: Option<String>,

    /// Step a parameter through values: `name=v1,v2,...`
    #[arg(long)]
    step: Option<String>,

    /// Substitute parameter definitions into element values
    #[arg(short, long)]
    numeric: bool,

    /// Rebuild the matrix for every step instead of substituting
    #[arg(long)]
    rebuild: bool,

    /// Report frequencies in rad/s instead of Hz
    #[arg(long)]
    rad: bool,

    /// Use Maxima as symbolic backend
    #[arg(long)]
    maxima: bool,
}

fn parse_step(text: &str) -> Result<StepSpec> {
    let (name, values) = text
        .split_once('=')
        .ok_or_else(|| SymnaError::invalid_step(format!("expected name=v1,v2,..., got '{}'", text)))?;
    let values = values
        .split(',')
        .map(|v| parse_value(v).ok_or_else(|| SymnaError::invalid_step(format!("bad step value '{}'", v))))
        .collect::<Result<Vec<f64>>>()?;
    let spec = StepSpec::list(name.trim(), values);
    spec.validate()?;
    Ok(spec)
}

fn instruction(args: &Args) -> Result<Instruction> {
    let data_type: DataType = args.kind.parse()?;
    let gain_type: GainType = args.gain_type.parse()?;
    let mut ins = Instruction::new(data_type, gain_type).with_numeric(args.numeric);
    if let Some(source) = &args.source {
        ins = ins.with_source(source.clone());
    }
    if let Some(detector) = &args.detector {
        ins = ins.with_detector(Detector::parse(detector)?);
    }
    if let Some(lg_ref) = &args.lg_ref {
        ins = ins.with_lg_ref(lg_ref.clone());
    }
    if let Some(step) = &args.step {
        ins = ins.with_step(parse_step(step)?);
    }
    Ok(ins)
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = AnalysisConfig::default()
        .with_step_function(!args.rebuild)
        .with_hz(!args.rad);
    let ins = instruction(&args)?;

    // Parse and build the circuit
    let ast = dsl::parse_file(&args.netlist)?;
    let mut circuit = Circuit::from_ast(ast);
    for err in &circuit.errors {
        eprintln!("error: {}", err);
    }

    let native = NativeBackend::new();
    let maxima = MaximaBackend::from_config(&config);
    let backend: &dyn SymbolicBackend = if args.maxima && maxima.is_available() {
        &maxima
    } else {
        if args.maxima {
            warn!(command = %config.maxima_command, "Maxima not available, using the native backend");
        }
        &native
    };

    let result = execute(&mut circuit, &ins, &config, backend)?;
    print!("{}", result);

    Ok(())
}
