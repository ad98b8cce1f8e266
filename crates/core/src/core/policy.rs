// Softmax policies and inverse-CDF action sampling.

/// Write p_i ∝ exp(v_i · τ) into `out`.
///
/// The scaled values are shifted by their maximum before exponentiation, so
/// large temperatures cannot overflow. τ = 0 yields the uniform distribution.
pub fn softmax_into(values: &[f64], temperature: f64, out: &mut Vec<f64>) {
    out.clear();
    if values.is_empty() {
        return;
    }
    let max = values
        .iter()
        .map(|v| v * temperature)
        .fold(f64::NEG_INFINITY, f64::max);
    out.extend(values.iter().map(|v| (v * temperature - max).exp()));
    let sum: f64 = out.iter().sum();
    for p in out.iter_mut() {
        *p /= sum;
    }
}

pub fn softmax(values: &[f64], temperature: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    softmax_into(values, temperature, &mut out);
    out
}

/// In-place mixture `w * wm + (1 - w) * rl`, stored back into `rl`.
pub fn blend_into(wm: &[f64], rl: &mut [f64], w: f64) {
    for (r, &m) in rl.iter_mut().zip(wm) {
        *r = w * m + (1.0 - w) * *r;
    }
}

/// Index of the first cumulative probability strictly greater than `u`.
///
/// `u` is a uniform draw in [0, 1). Rounding can leave the total a hair
/// below 1, so the result is clamped to the last index.
pub fn sample_categorical(probs: &[f64], u: f64) -> usize {
    let mut acc = 0.0;
    for (i, p) in probs.iter().enumerate() {
        acc += p;
        if acc > u {
            return i;
        }
    }
    probs.len().saturating_sub(1)
}

/// True when `probs` is a finite distribution summing to one.
pub fn is_distribution(probs: &[f64], tol: f64) -> bool {
    !probs.is_empty()
        && probs.iter().all(|p| p.is_finite() && *p >= 0.0)
        && (probs.iter().sum::<f64>() - 1.0).abs() <= tol
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn near_zero_temperature_is_uniform() {
        let p = softmax(&[1.0, 0.0], 1e-12);
        assert!((p[0] - 0.5).abs() < 1e-9);
        assert!((p[1] - 0.5).abs() < 1e-9);

        let p = softmax(&[1.0, 0.0], 0.0);
        assert_eq!(p, vec![0.5, 0.5]);
    }

    #[test]
    fn large_temperature_is_greedy() {
        let p = softmax(&[1.0, 0.0], 100.0);
        assert!((p[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn inverse_cdf_picks_the_right_bin() {
        let probs = [0.2, 0.5, 0.3];
        assert_eq!(sample_categorical(&probs, 0.0), 0);
        assert_eq!(sample_categorical(&probs, 0.19), 0);
        assert_eq!(sample_categorical(&probs, 0.2), 1);
        assert_eq!(sample_categorical(&probs, 0.69), 1);
        assert_eq!(sample_categorical(&probs, 0.99), 2);
        // Short-summing distribution still yields a valid index.
        assert_eq!(sample_categorical(&[0.3, 0.3], 0.999), 1);
    }

    #[test]
    fn blend_weights_the_two_policies() {
        let wm = [1.0, 0.0];
        let mut rl = vec![0.0, 1.0];
        blend_into(&wm, &mut rl, 0.25);
        assert_eq!(rl, vec![0.25, 0.75]);
    }

    proptest! {
        #[test]
        fn softmax_sums_to_one(
            values in proptest::collection::vec(-50.0f64..50.0, 1..12),
            temperature in 1e-6f64..100.0,
        ) {
            let p = softmax(&values, temperature);
            prop_assert_eq!(p.len(), values.len());
            prop_assert!(is_distribution(&p, 1e-9));
        }
    }
}
