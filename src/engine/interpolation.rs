use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

/// Piecewise-linear interpolation over sorted `xs`, extrapolating linearly
/// from the outermost segment. Requires at least two points.
pub fn linear_extrapolate(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    debug_assert!(xs.len() >= 2 && xs.len() == ys.len());
    let n = xs.len();
    let seg = match xs.iter().position(|&xi| xi > x) {
        Some(0) => 0,
        Some(i) => i - 1,
        None => n - 2,
    }
    .min(n - 2);
    let (x0, x1, y0, y1) = (xs[seg], xs[seg + 1], ys[seg], ys[seg + 1]);
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

/// Implied volatility as a function of strike for one maturity.
#[derive(Debug, Clone, PartialEq)]
pub struct SkewLine {
    strikes: Vec<f64>,
    ivs: Vec<f64>,
    min_iv: f64,
    max_iv: f64,
}

impl SkewLine {
    /// Build from `(strike, iv)` points. Duplicate strikes are averaged.
    /// Returns `None` unless at least two distinct strikes remain.
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        let mut by_strike: BTreeMap<OrderedFloat<f64>, (f64, usize)> = BTreeMap::new();
        for (strike, iv) in points {
            if !(strike.is_finite() && iv.is_finite()) {
                continue;
            }
            let entry = by_strike.entry(OrderedFloat(strike)).or_insert((0.0, 0));
            entry.0 += iv;
            entry.1 += 1;
        }
        if by_strike.len() < 2 {
            return None;
        }

        let (strikes, ivs): (Vec<f64>, Vec<f64>) = by_strike
            .into_iter()
            .map(|(k, (sum, count))| (k.0, sum / count as f64))
            .unzip();
        let min_iv = ivs.iter().copied().fold(f64::INFINITY, f64::min);
        let max_iv = ivs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            strikes,
            ivs,
            min_iv,
            max_iv,
        })
    }

    pub fn strikes(&self) -> &[f64] {
        &self.strikes
    }

    pub fn min_iv(&self) -> f64 {
        self.min_iv
    }

    pub fn max_iv(&self) -> f64 {
        self.max_iv
    }

    /// Linear interpolation with extrapolation, clamped to
    /// `[min_iv, max_iv * margin]`.
    pub fn iv_at(&self, strike: f64, margin: f64) -> f64 {
        let iv = linear_extrapolate(strike, &self.strikes, &self.ivs);
        iv.min(self.max_iv * margin).max(self.min_iv)
    }
}

/// Variance-time interpolation between two `(tau, iv)` points.
///
/// Total variance `tau * iv^2` is interpolated linearly in tau (extrapolated
/// outside the two points) and converted back to an IV at `tau`. When
/// extrapolation drives the variance to zero or below, the IV of the nearer
/// point is returned instead.
pub fn variance_time_iv(tau: f64, (tau_lo, iv_lo): (f64, f64), (tau_hi, iv_hi): (f64, f64)) -> f64 {
    if (tau_hi - tau_lo).abs() < f64::EPSILON {
        return iv_lo;
    }
    let var_lo = tau_lo * iv_lo * iv_lo;
    let var_hi = tau_hi * iv_hi * iv_hi;
    let variance = var_lo + (tau - tau_lo) * (var_hi - var_lo) / (tau_hi - tau_lo);
    if variance > 0.0 && tau > 0.0 {
        (variance / tau).sqrt()
    } else if (tau - tau_lo).abs() <= (tau - tau_hi).abs() {
        iv_lo
    } else {
        iv_hi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn linear_interpolates_and_extrapolates() {
        let xs = [1.0, 2.0, 4.0];
        let ys = [10.0, 20.0, 0.0];
        assert_eq!(linear_extrapolate(1.5, &xs, &ys), 15.0);
        assert_eq!(linear_extrapolate(3.0, &xs, &ys), 10.0);
        assert_eq!(linear_extrapolate(0.0, &xs, &ys), 0.0);
        assert_eq!(linear_extrapolate(5.0, &xs, &ys), -10.0);
        assert_eq!(linear_extrapolate(2.0, &xs, &ys), 20.0);
    }

    #[test]
    fn skew_line_needs_two_distinct_strikes() {
        assert!(SkewLine::from_points([(100.0, 0.5)]).is_none());
        assert!(SkewLine::from_points([(100.0, 0.5), (100.0, 0.6)]).is_none());
        let line = SkewLine::from_points([(100.0, 0.5), (100.0, 0.7), (110.0, 0.4)]).unwrap();
        assert_eq!(line.strikes(), &[100.0, 110.0]);
        assert!((line.iv_at(100.0, 1.25) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn skew_line_clamps_extrapolation() {
        let line = SkewLine::from_points([(90.0, 0.8), (100.0, 0.6), (110.0, 0.5)]).unwrap();
        // Far left extrapolation would explode; capped at 1.25 x max.
        assert!((line.iv_at(10.0, 1.25) - 1.0).abs() < 1e-12);
        // Far right extrapolation would go negative; floored at min.
        assert_eq!(line.iv_at(1000.0, 1.25), 0.5);
        assert!((line.iv_at(95.0, 1.25) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn clamp_holds_for_random_lines() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let points: Vec<(f64, f64)> = (0..rng.random_range(2..8_i32))
                .map(|i| (50.0 + 10.0 * f64::from(i), rng.random_range(0.05..3.0)))
                .collect();
            let line = SkewLine::from_points(points).unwrap();
            let margin = rng.random_range(1.0..2.0);
            for _ in 0..50 {
                let iv = line.iv_at(rng.random_range(1.0..500.0), margin);
                assert!(iv >= line.min_iv());
                assert!(iv <= line.max_iv() * margin + 1e-12);
            }
        }
    }

    #[test]
    fn variance_time_blend() {
        let (t7, t14, t30) = (7.0 / 365.25, 14.0 / 365.25, 30.0 / 365.25);
        let iv = variance_time_iv(t14, (t7, 0.5), (t30, 0.7));
        let expected = ((7.0_f64 * 0.25 + (7.0 / 23.0) * (30.0 * 0.49 - 7.0 * 0.25)) / 14.0).sqrt();
        assert!((iv - expected).abs() < 1e-12);
        assert!(iv > 0.5 && iv < 0.7);
        // Not IV-linear
        let iv_linear = 0.5 + (7.0 / 23.0) * 0.2;
        assert!((iv - iv_linear).abs() > 1e-4);
    }

    #[test]
    fn variance_time_recovers_endpoints() {
        let iv = variance_time_iv(0.1, (0.1, 0.4), (0.3, 0.9));
        assert!((iv - 0.4).abs() < 1e-12);
        let iv = variance_time_iv(0.3, (0.1, 0.4), (0.3, 0.9));
        assert!((iv - 0.9).abs() < 1e-12);
    }

    #[test]
    fn negative_extrapolated_variance_uses_nearer_point() {
        // Variance falling fast with tenor; extrapolating far right goes negative.
        let iv = variance_time_iv(1.0, (0.1, 2.0), (0.2, 0.1));
        assert_eq!(iv, 0.1);
    }
}
