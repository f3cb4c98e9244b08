//! Maxima subprocess backend.
//!
//! Each call writes a short batch script to a temporary file, runs Maxima
//! on it with stdout redirected to a second temporary file and reads the
//! last non-empty output line back. The process is killed when it exceeds
//! the configured timeout.

use std::io::Write;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::translate::parse_output;
use super::{CasError, SymbolicBackend};
use crate::config::AnalysisConfig;
use crate::symbolic::{Expr, Node, SymMatrix};

/// Poll interval while waiting for the Maxima process.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Backend that delegates to an external Maxima installation.
#[derive(Debug, Clone)]
pub struct MaximaBackend {
    command: String,
    timeout: Duration,
}

impl MaximaBackend {
    /// Create a backend that runs `command` with the given timeout per call.
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    /// Create a backend from the analysis configuration.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.maxima_command.clone(), config.cas_timeout)
    }

    /// Check whether the Maxima executable can be started.
    pub fn is_available(&self) -> bool {
        Command::new(&self.command)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Batch script that evaluates `statement` into `res` and prints it as
    /// a single line.
    fn script(statement: &str) -> String {
        format!(
            "display2d:false$\nlinel:1000000$\nres:{}$\nprint(string(res))$\n",
            statement
        )
    }

    /// Run one statement and parse the printed result.
    fn evaluate(&self, statement: &str) -> Result<Node, CasError> {
        let io_err = |e: std::io::Error| CasError::Process(e.to_string());

        let mut script_file = NamedTempFile::new().map_err(io_err)?;
        script_file
            .write_all(Self::script(statement).as_bytes())
            .map_err(io_err)?;
        let output_file = NamedTempFile::new().map_err(io_err)?;
        let stdout = output_file.reopen().map_err(io_err)?;

        debug!(command = %self.command, %statement, "running Maxima");
        let child = Command::new(&self.command)
            .arg("--very-quiet")
            .arg("-b")
            .arg(script_file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::null())
            .spawn()
            .map_err(io_err)?;

        let status = wait_with_timeout(child, self.timeout)?;
        if !status.success() {
            warn!(%status, "Maxima exited with failure");
        }

        let raw = std::fs::read_to_string(output_file.path()).map_err(io_err)?;
        parse_output(&raw)
    }

    fn evaluate_expr(&self, statement: &str) -> Result<Expr, CasError> {
        let node = self.evaluate(statement)?;
        node.to_expr().map_err(|err| CasError::Unparseable {
            output: node.to_string(),
            message: err.to_string(),
        })
    }
}

impl SymbolicBackend for MaximaBackend {
    fn name(&self) -> &str {
        "maxima"
    }

    fn determinant(&self, m: &SymMatrix) -> Result<Expr, CasError> {
        self.evaluate_expr(&format!("ratsimp(determinant({}))", m.to_maxima()))
    }

    fn limit(&self, expr: &Expr, var: &str, point: f64) -> Result<Expr, CasError> {
        let node = self.evaluate(&format!("limit({}, {}, {})", expr.to_maxima(), var, point))?;
        match &node {
            Node::Symbol(name) if matches!(name.as_str(), "inf" | "minf" | "infinity" | "und" | "ind") => {
                Err(CasError::unsupported(format!("limit is {}", name)))
            }
            _ => node.to_expr().map_err(|err| CasError::Unparseable {
                output: node.to_string(),
                message: err.to_string(),
            }),
        }
    }

    fn inverse_laplace(&self, expr: &Expr, s: &str, t: &str) -> Result<Node, CasError> {
        let node = self.evaluate(&format!("ilt({}, {}, {})", expr.to_maxima(), s, t))?;
        if node.to_string().contains("ilt(") {
            return Err(CasError::unsupported("Maxima returned an unevaluated inverse Laplace transform"));
        }
        Ok(node)
    }

    fn integrate(&self, expr: &Expr, var: &str, lower: f64, upper: f64) -> Result<Expr, CasError> {
        let bound = |x: f64| {
            if x == f64::INFINITY {
                "inf".to_string()
            } else if x == f64::NEG_INFINITY {
                "minf".to_string()
            } else {
                format!("{}", x)
            }
        };
        self.evaluate_expr(&format!(
            "float(integrate({}, {}, {}, {}))",
            expr.to_maxima(),
            var,
            bound(lower),
            bound(upper)
        ))
    }

    fn solve_linear(&self, m: &SymMatrix, rhs: &[Expr]) -> Result<Vec<Expr>, CasError> {
        let column: Vec<String> = rhs.iter().map(|e| format!("[{}]", e.to_maxima())).collect();
        let node = self.evaluate(&format!(
            "ratsimp(invert({}) . matrix({}))",
            m.to_maxima(),
            column.join(", ")
        ))?;
        let rows = match node {
            Node::List(rows) => rows,
            other => {
                return Err(CasError::Unparseable {
                    output: other.to_string(),
                    message: "expected a column matrix".to_string(),
                })
            }
        };
        rows.into_iter()
            .map(|row| {
                let entry = match row {
                    Node::List(mut items) if items.len() == 1 => items.remove(0),
                    other => other,
                };
                entry.to_expr().map_err(|err| CasError::Unparseable {
                    output: entry.to_string(),
                    message: err.to_string(),
                })
            })
            .collect()
    }
}

/// Wait for a child process, killing it when `timeout` elapses.
fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<ExitStatus, CasError> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!(?timeout, "Maxima timed out");
                    return Err(CasError::Timeout(timeout));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(CasError::Process(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_layout() {
        let script = MaximaBackend::script("limit((1)/(1 + s), s, 0)");
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines[0], "display2d:false$");
        assert_eq!(lines[1], "linel:1000000$");
        assert_eq!(lines[2], "res:limit((1)/(1 + s), s, 0)$");
        assert_eq!(lines[3], "print(string(res))$");
    }

    #[test]
    fn test_missing_executable_is_process_error() {
        let backend = MaximaBackend::new("symna-no-such-maxima", Duration::from_secs(1));
        assert!(!backend.is_available());
        let err = backend.limit(&Expr::symbol("s"), "s", 0.0).unwrap_err();
        assert!(matches!(err, CasError::Process(_)));
    }

    #[test]
    #[ignore] // Requires Maxima to be installed
    fn test_maxima_limit() {
        let backend = MaximaBackend::from_config(&AnalysisConfig::default());
        if !backend.is_available() {
            return;
        }
        let h = Expr::parse("R2/(R1 + R2 + s*C*R1*R2)").unwrap();
        let dc = backend.limit(&h, "s", 0.0).unwrap();
        assert_eq!(dc, Expr::parse("R2/(R1 + R2)").unwrap());
    }
}
