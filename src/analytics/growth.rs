/// Result of comparing a `current` window against `previous`, per §4.5.1.
pub struct GrowthResult {
    pub absolute_change: f64,
    pub growth_rate: f64,
    pub momentum: Option<f64>,
    pub trend: &'static str,
}

fn growth_rate(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current > 0.0 { 100.0 } else { 0.0 }
    } else {
        (current - previous) / previous * 100.0
    }
}

/// `prior` is the window before `previous`; `None` means no prior-previous
/// data exists, in which case the trend is classified `new`.
pub fn compute(current: f64, previous: f64, prior: Option<f64>) -> GrowthResult {
    let absolute_change = current - previous;
    let rate = growth_rate(current, previous);

    let Some(prior) = prior else {
        return GrowthResult {
            absolute_change,
            growth_rate: rate,
            momentum: None,
            trend: "new",
        };
    };

    let previous_growth = growth_rate(previous, prior);
    let momentum = rate - previous_growth;
    let trend = if momentum > 0.0 {
        "accelerating"
    } else if momentum < -5.0 {
        "decelerating"
    } else {
        "steady"
    };

    GrowthResult {
        absolute_change,
        growth_rate: rate,
        momentum: Some(momentum),
        trend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
        assert!(
            (actual - expected).abs() < epsilon,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn no_prior_data_classifies_new() {
        let r = compute(100.0, 50.0, None);
        assert_approx(r.absolute_change, 50.0, 1e-9);
        assert_approx(r.growth_rate, 100.0, 1e-9);
        assert_eq!(r.momentum, None);
        assert_eq!(r.trend, "new");
    }

    #[test]
    fn zero_previous_with_positive_current_is_100_percent() {
        let r = compute(10.0, 0.0, Some(0.0));
        assert_approx(r.growth_rate, 100.0, 1e-9);
    }

    #[test]
    fn zero_previous_and_zero_current_is_zero_percent() {
        let r = compute(0.0, 0.0, Some(0.0));
        assert_approx(r.growth_rate, 0.0, 1e-9);
    }

    #[test]
    fn accelerating_when_momentum_positive() {
        // previous_growth = 100, growth_rate = 150, momentum = 50
        let r = compute(100.0, 40.0, Some(20.0));
        assert_eq!(r.trend, "accelerating");
        assert!(r.momentum.unwrap() > 0.0);
    }

    #[test]
    fn decelerating_when_momentum_below_negative_five() {
        // previous_growth = 400, growth_rate = -50, momentum = -450
        let r = compute(50.0, 100.0, Some(20.0));
        assert_eq!(r.trend, "decelerating");
        assert!(r.momentum.unwrap() < -5.0);
    }

    #[test]
    fn steady_when_momentum_within_band() {
        let r = compute(105.0, 100.0, Some(98.0));
        assert_eq!(r.trend, "steady");
    }
}
