//! Uniform priors over the calibrated parameters.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformPrior {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

impl UniformPrior {
    pub fn new(name: &str, bounds: [f64; 2]) -> Self {
        Self {
            name: name.to_string(),
            lower: bounds[0],
            upper: bounds[1],
        }
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// `-ln(width)` inside the bounds, `-inf` outside.
    pub fn log_density(&self, value: f64) -> f64 {
        if self.contains(value) {
            -self.width().ln()
        } else {
            f64::NEG_INFINITY
        }
    }

    /// Map `u ∈ [0, 1]` to the prior support.
    pub fn from_unit(&self, u: f64) -> f64 {
        self.lower + u.clamp(0.0, 1.0) * self.width()
    }

    pub fn to_unit(&self, value: f64) -> f64 {
        ((value - self.lower) / self.width()).clamp(0.0, 1.0)
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }
}

/// Priors for every parameter that can be calibrated.
pub fn all_priors() -> Vec<UniformPrior> {
    vec![
        UniformPrior::new("transmission_rate", [0.1, 10.0]),
        UniformPrior::new("activation_rate_early", [0.0, 1.0]),
        UniformPrior::new("activation_rate_late", [0.0, 1.0]),
        UniformPrior::new("stabilisation_rate", [0.0, 1.0]),
        UniformPrior::new("rr_reinfection_latent_late", [0.2, 0.5]),
        UniformPrior::new("rr_reinfection_recovered", [0.5, 1.0]),
        UniformPrior::new("self_recovery_rate", [0.0, 0.5]),
        UniformPrior::new("tb_death_rate", [0.0, 0.5]),
        UniformPrior::new("current_passive_detection_rate", [0.2, 2.0]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_is_flat_inside_and_zero_outside() {
        let p = UniformPrior::new("x", [0.2, 0.5]);
        let inside = p.log_density(0.3);
        assert!((inside - (-(0.3_f64).ln())).abs() < 1e-12);
        assert_eq!(p.log_density(0.2), inside);
        assert_eq!(p.log_density(0.5), inside);
        assert_eq!(p.log_density(0.51), f64::NEG_INFINITY);
        assert_eq!(p.log_density(f64::NAN), f64::NEG_INFINITY);
    }

    #[test]
    fn unit_mapping_round_trips() {
        let p = UniformPrior::new("x", [0.1, 10.0]);
        assert_eq!(p.from_unit(0.0), 0.1);
        assert_eq!(p.from_unit(1.0), 10.0);
        assert_eq!(p.from_unit(2.0), 10.0);
        assert!((p.to_unit(p.from_unit(0.37)) - 0.37).abs() < 1e-12);
    }

    #[test]
    fn prior_names_are_unique() {
        let priors = all_priors();
        assert_eq!(priors.len(), 9);
        for (i, p) in priors.iter().enumerate() {
            assert!(p.upper > p.lower);
            assert!(!priors[..i].iter().any(|q| q.name == p.name));
        }
    }
}
