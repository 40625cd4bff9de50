//! Strike root-finding.
//!
//! The objective is searched in log-strike space: starting from a seed
//! strike, the search expands geometrically in both directions until the
//! objective changes sign, then bisects the bracket. Non-convergence is an
//! error, never a silent fallback to the seed.

use super::error::SurfaceError;

const MAX_EXPANSIONS: usize = 40;
const MAX_BISECTIONS: usize = 200;
const LOG_STRIKE_TOL: f64 = 1e-12;

/// Find `k > 0` with `objective(k) == 0`.
///
/// `objective` is expected to be monotonic in the searched region. `what`
/// and `target` only label the error.
pub fn solve_strike<F>(
    seed: f64,
    what: &'static str,
    target: f64,
    tolerance: f64,
    mut objective: F,
) -> Result<f64, SurfaceError>
where
    F: FnMut(f64) -> f64,
{
    if !(seed.is_finite() && seed > 0.0) {
        return Err(SurfaceError::invalid_input(format!(
            "solver seed must be a positive strike, got {seed}"
        )));
    }

    let mut g = |x: f64| objective(x.exp());
    let x0 = seed.ln();
    let g0 = g(x0);
    if !g0.is_finite() {
        return Err(SurfaceError::NonConvergence {
            what,
            target,
            iterations: 0,
        });
    }
    if g0.abs() <= tolerance {
        return Ok(seed);
    }

    let mut bracket = None;
    let mut step = std::f64::consts::LN_2 / 8.0;
    for _ in 0..MAX_EXPANSIONS {
        for x in [x0 + step, x0 - step] {
            let gx = g(x);
            if gx.abs() <= tolerance {
                return Ok(x.exp());
            }
            if gx.is_finite() && gx.signum() != g0.signum() {
                bracket = Some(if x > x0 { (x0, g0, x) } else { (x, gx, x0) });
                break;
            }
        }
        if bracket.is_some() {
            break;
        }
        step *= 2.0;
    }
    let Some((mut lo, mut g_lo, mut hi)) = bracket else {
        return Err(SurfaceError::NonConvergence {
            what,
            target,
            iterations: MAX_EXPANSIONS,
        });
    };

    for _ in 0..MAX_BISECTIONS {
        let mid = 0.5 * (lo + hi);
        let g_mid = g(mid);
        if !g_mid.is_finite() {
            break;
        }
        if g_mid.abs() <= tolerance || hi - lo < LOG_STRIKE_TOL {
            return Ok(mid.exp());
        }
        if g_mid.signum() == g_lo.signum() {
            lo = mid;
            g_lo = g_mid;
        } else {
            hi = mid;
        }
    }

    Err(SurfaceError::NonConvergence {
        what,
        target,
        iterations: MAX_BISECTIONS,
    })
}
