use approx::assert_relative_eq;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use relax::sampler::{
    bernoulli_sample, conditional_logistic_sample, conditional_noise, logit, logistic_sample,
    sigmoid, NoiseBatch,
};

#[test]
fn bernoulli_sample_thresholds_against_probability() {
    let logits = [0.0, 10.0, -10.0, 0.5];
    let u = [0.3, 0.999, 0.001, 0.7];
    let b = bernoulli_sample(&logits, &u);
    // u < σ(logit) picks 1.
    assert_eq!(b, vec![1.0, 1.0, 0.0, 0.0]);
}

#[test]
fn logit_inverts_sigmoid() {
    for &x in &[-4.0, -0.3, 0.0, 1.7] {
        assert_relative_eq!(logit(sigmoid(x)), x, max_relative = 1e-9, epsilon = 1e-9);
    }
}

#[test]
fn conditional_noise_respects_realized_sample() {
    // The conditional relaxation must land on the side of the threshold the
    // discrete sample realized: b = 1 ⇔ z̃ > 0.
    let mut rng = XorShiftRng::seed_from_u64(42);
    for _ in 0..1000 {
        let theta = 4.0 * rng.gen::<f64>() - 2.0;
        let v = rng.gen::<f64>();
        let z1 = conditional_logistic_sample(theta, 1.0, v);
        let z0 = conditional_logistic_sample(theta, 0.0, v);
        assert!(z1 > 0.0, "b = 1 but z̃ = {z1} at theta = {theta}, v = {v}");
        assert!(z0 < 0.0, "b = 0 but z̃ = {z0} at theta = {theta}, v = {v}");
    }
}

#[test]
fn conditional_noise_interpolates_restricted_interval() {
    // With u′ = σ(−θ): b = 1 maps v onto (u′, 1), b = 0 onto (0, u′).
    let theta = 0.8;
    let u0 = sigmoid(-theta);
    assert_relative_eq!(conditional_noise(theta, 1.0, 0.0), u0, max_relative = 1e-12);
    assert_relative_eq!(conditional_noise(theta, 1.0, 1.0), 1.0, max_relative = 1e-12);
    assert_relative_eq!(conditional_noise(theta, 0.0, 1.0), u0, max_relative = 1e-12);
    assert_relative_eq!(
        conditional_noise(theta, 0.0, 0.0),
        0.0,
        max_relative = 1e-12,
        epsilon = 1e-15
    );
}

/// Closed-form CDF of `σ(z̃)` given `b`, for a single coordinate: the
/// logistic with location `θ` truncated to one side of zero.
fn conditional_cdf(s: f64, theta: f64, b: f64) -> f64 {
    let f = sigmoid(logit(s) - theta);
    let u0 = sigmoid(-theta);
    let c = if b == 1.0 {
        (f - u0) / (1.0 - u0)
    } else {
        f / u0
    };
    c.clamp(0.0, 1.0)
}

fn ks_statistic(mut samples: Vec<f64>, cdf: impl Fn(f64) -> f64) -> f64 {
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = samples.len() as f64;
    let mut ks = 0.0_f64;
    for (i, &s) in samples.iter().enumerate() {
        let theory = cdf(s);
        let lo = i as f64 / n;
        let hi = (i + 1) as f64 / n;
        ks = ks.max((theory - lo).abs()).max((theory - hi).abs());
    }
    ks
}

#[test]
fn conditional_relaxation_matches_truncated_logistic() {
    // Kolmogorov–Smirnov check of σ(z̃) against the closed-form conditional
    // CDF, both realized outcomes. 1.63/√n is the 1% critical value; the
    // threshold leaves headroom above it.
    let theta = 0.7;
    let n = 20_000;
    let mut rng = XorShiftRng::seed_from_u64(7);

    for &b in &[1.0, 0.0] {
        let samples: Vec<f64> = (0..n)
            .map(|_| sigmoid(conditional_logistic_sample(theta, b, rng.gen::<f64>())))
            .collect();
        let ks = ks_statistic(samples, |s| conditional_cdf(s, theta, b));
        assert!(
            ks < 0.02,
            "KS statistic {ks} for b = {b} exceeds threshold"
        );
    }
}

#[test]
fn saturated_logits_stay_finite() {
    // Saturation must be absorbed by clamping, never surfacing as NaN.
    for &theta in &[60.0, -60.0, 1e6, -1e6] {
        for &v in &[1e-12, 0.5, 1.0 - 1e-12] {
            for &b in &[0.0, 1.0] {
                let z = logistic_sample(theta, v);
                let zt = conditional_logistic_sample(theta, b, v);
                assert!(z.is_finite(), "z = {z} at theta = {theta}, v = {v}");
                assert!(zt.is_finite(), "z̃ = {zt} at theta = {theta}, v = {v}, b = {b}");
            }
        }
    }
}

#[test]
fn noise_batch_is_reproducible_and_open() {
    let a = NoiseBatch::draw(4, 3, 17);
    let b = NoiseBatch::draw(4, 3, 17);
    let c = NoiseBatch::draw(4, 3, 18);

    assert_eq!(a.num_samples(), 4);
    assert_eq!(a.dim(), 3);

    let mut all_equal = true;
    for i in 0..4 {
        let (au, av) = a.row(i);
        let (bu, bv) = b.row(i);
        let (cu, cv) = c.row(i);
        assert_eq!(au, bu);
        assert_eq!(av, bv);
        all_equal &= au == cu && av == cv;
        for &x in au.iter().chain(av) {
            assert!((0.0..1.0).contains(&x));
        }
    }
    assert!(!all_equal, "different seeds should give different noise");
}
