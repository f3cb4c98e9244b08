//! Servo bandwidth from the asymptotic Bode plot of a loop gain.

use num_complex::Complex64;
use tracing::debug;

use super::roots::{cancel_pole_zero, expr_roots};
use crate::config::AnalysisConfig;
use crate::error::{Result, SymnaError};
use crate::symbolic::Expr;

/// Roots with a magnitude below this are treated as lying at the origin.
const ORIGIN_TOLERANCE: f64 = 1e-12;

/// Unity-gain crossing of the asymptotic loop gain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    /// Crossing frequency (Hz or rad/s per configuration).
    pub frequency: f64,
    /// Slope order of the asymptote at the crossing.
    pub order: i32,
}

/// First flat segment of the asymptotic loop gain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidBand {
    /// Magnitude of the flat asymptote.
    pub value: f64,
    /// Lowest frequency of the flat segment.
    pub frequency: f64,
}

/// Servo bandwidth of a loop gain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServoBandwidth {
    /// Lowest crossing where the asymptote rises through unity.
    pub low: Option<Crossing>,
    /// Highest crossing where the asymptote falls through unity.
    pub high: Option<Crossing>,
    /// Flat mid-band segment, when the asymptote has one.
    pub mid_band: Option<MidBand>,
}

/// Asymptotic corner: a pole (`direction = -1`) or zero (`+1`) at `omega`.
#[derive(Debug, Clone, Copy)]
struct Corner {
    omega: f64,
    direction: i32,
}

/// Compute the servo bandwidth of a numeric loop gain `lg(s)`.
pub fn servo_bandwidth(lg: &Expr, config: &AnalysisConfig) -> Result<ServoBandwidth> {
    let s = config.laplace.as_str();
    let (num, den) = lg.as_polynomial_ratio(s);
    let zeros = expr_roots(&Expr::from(num.clone()), s)?;
    let poles = expr_roots(&Expr::from(den.clone()), s)?;
    let (poles, zeros) = cancel_pole_zero(&poles, &zeros, config.pz_cancel_tolerance);

    let at_origin = |r: &Complex64| r.norm() <= ORIGIN_TOLERANCE;
    let mut order = zeros.iter().filter(|z| at_origin(z)).count() as i32
        - poles.iter().filter(|p| at_origin(p)).count() as i32;

    let gain = low_frequency_gain(lg, s)?;
    let mut corners: Vec<Corner> = zeros
        .iter()
        .filter(|z| !at_origin(z))
        .map(|z| Corner {
            omega: z.norm(),
            direction: 1,
        })
        .chain(poles.iter().filter(|p| !at_origin(p)).map(|p| Corner {
            omega: p.norm(),
            direction: -1,
        }))
        .collect();
    corners.sort_by(|a, b| a.omega.partial_cmp(&b.omega).unwrap_or(std::cmp::Ordering::Equal));

    let mut g = gain.abs();
    let mut start = 0.0;
    let mut result = ServoBandwidth::default();

    // One walk over the segments between consecutive corners; the last
    // segment extends to infinity.
    for idx in 0..=corners.len() {
        let end = corners.get(idx).map_or(f64::INFINITY, |c| c.omega);
        if order == 0 {
            if result.mid_band.is_none() {
                result.mid_band = Some(MidBand {
                    value: g,
                    frequency: config.report_frequency(start),
                });
            }
        } else {
            let crossing = (1.0 / g).powf(1.0 / order as f64);
            if crossing.is_finite() && crossing >= start && crossing < end {
                let found = Crossing {
                    frequency: config.report_frequency(crossing),
                    order,
                };
                if order > 0 && result.low.is_none() {
                    result.low = Some(found);
                } else if order < 0 {
                    result.high = Some(found);
                }
            }
        }
        if let Some(corner) = corners.get(idx) {
            g *= corner.omega.powi(-corner.direction);
            order += corner.direction;
            start = corner.omega;
        }
    }
    debug!(?result, "servo bandwidth");
    Ok(result)
}

/// Coefficient of the lowest power of `s` in the loop gain: `lg ~ K * s^l`
/// for `s -> 0`.
fn low_frequency_gain(lg: &Expr, s: &str) -> Result<f64> {
    let (num, den) = lg.as_polynomial_ratio(s);
    let lowest = |p: &crate::symbolic::Poly| -> Result<f64> {
        let coeffs = p.coefficients_in(s);
        let (_, c) = coeffs.iter().next().ok_or_else(|| SymnaError::NotNumeric {
            expr: lg.to_string(),
        })?;
        c.constant_value().ok_or_else(|| SymnaError::NotNumeric {
            expr: lg.to_string(),
        })
    };
    Ok(lowest(&num)? / lowest(&den)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rad() -> AnalysisConfig {
        AnalysisConfig::default().with_hz(false)
    }

    #[test]
    fn test_single_pole_loop() {
        let lg = Expr::parse("1000/(1 + s/10)").unwrap();
        let bw = servo_bandwidth(&lg, &rad()).unwrap();
        assert!(bw.low.is_none());
        let high = bw.high.unwrap();
        assert_relative_eq!(high.frequency, 1e4, max_relative = 1e-9);
        assert_eq!(high.order, -1);
        let mid = bw.mid_band.unwrap();
        assert_relative_eq!(mid.value, 1000.0, max_relative = 1e-9);
        assert_eq!(mid.frequency, 0.0);
    }

    #[test]
    fn test_band_pass_loop() {
        let lg = Expr::parse("1000*s/((1 + s/10)*(1 + s/1meg))").unwrap();
        let bw = servo_bandwidth(&lg, &rad()).unwrap();
        let low = bw.low.unwrap();
        assert_relative_eq!(low.frequency, 1e-3, max_relative = 1e-6);
        assert_eq!(low.order, 1);
        let mid = bw.mid_band.unwrap();
        assert_relative_eq!(mid.value, 1e4, max_relative = 1e-6);
        assert_relative_eq!(mid.frequency, 10.0, max_relative = 1e-6);
        let high = bw.high.unwrap();
        assert_relative_eq!(high.frequency, 1e10, max_relative = 1e-6);
        assert_eq!(high.order, -1);
    }

    #[test]
    fn test_report_in_hz() {
        let lg = Expr::parse("1000/(1 + s/10)").unwrap();
        let bw = servo_bandwidth(&lg, &AnalysisConfig::default()).unwrap();
        assert_relative_eq!(
            bw.high.unwrap().frequency,
            1e4 / (2.0 * std::f64::consts::PI),
            max_relative = 1e-9
        );
    }
}
