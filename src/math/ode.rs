//! Fixed-step Runge–Kutta integration.
//!
//! The compartmental models we integrate are small (a handful of states) and
//! only mildly stiff, so classical RK4 with a fixed number of sub-steps per
//! output interval is accurate enough and fully deterministic.

use nalgebra::DVector;

use crate::error::AppError;

/// Integrate `dy/dt = rhs(t, y)` and return the state at each output time.
///
/// - `output_times` must be strictly increasing; the first entry is the initial time.
/// - each output interval is split into `substeps` equal RK4 steps.
///
/// Fails if the state becomes non-finite.
pub fn integrate_rk4<F>(
    rhs: F,
    y0: &DVector<f64>,
    output_times: &[f64],
    substeps: usize,
) -> Result<Vec<DVector<f64>>, AppError>
where
    F: Fn(f64, &DVector<f64>) -> DVector<f64>,
{
    if output_times.is_empty() {
        return Err(AppError::input("ODE integration requires at least one output time."));
    }
    if output_times.windows(2).any(|w| !(w[1] > w[0])) {
        return Err(AppError::input("ODE output times must be strictly increasing."));
    }
    if substeps == 0 {
        return Err(AppError::input("ODE substeps must be > 0."));
    }

    let mut out = Vec::with_capacity(output_times.len());
    let mut y = y0.clone();
    out.push(y.clone());

    for w in output_times.windows(2) {
        let (t0, t1) = (w[0], w[1]);
        let h = (t1 - t0) / substeps as f64;
        for step in 0..substeps {
            let t = t0 + h * step as f64;
            y = rk4_step(&rhs, t, &y, h);
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(AppError::numeric(format!("Non-finite ODE state at t={t1}.")));
        }
        out.push(y.clone());
    }

    Ok(out)
}

fn rk4_step<F>(rhs: &F, t: f64, y: &DVector<f64>, h: f64) -> DVector<f64>
where
    F: Fn(f64, &DVector<f64>) -> DVector<f64>,
{
    let half = h / 2.0;
    let k1 = rhs(t, y);
    let k2 = rhs(t + half, &(y + &k1 * half));
    let k3 = rhs(t + half, &(y + &k2 * half));
    let k4 = rhs(t + h, &(y + &k3 * h));
    y + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_decay_matches_closed_form() {
        let rate = 0.7;
        let y0 = DVector::from_vec(vec![100.0]);
        let times: Vec<f64> = (0..=10).map(|i| i as f64).collect();
        let out = integrate_rk4(|_, y| y * -rate, &y0, &times, 20).unwrap();

        assert_eq!(out.len(), times.len());
        for (t, y) in times.iter().zip(out.iter()) {
            let exact = 100.0 * (-rate * t).exp();
            assert!((y[0] - exact).abs() < 1e-6, "t={t}: {} vs {exact}", y[0]);
        }
    }

    #[test]
    fn time_dependent_rhs_integrates_polynomial() {
        // dy/dt = 3t^2 -> y = t^3 (RK4 is exact for cubics).
        let y0 = DVector::from_vec(vec![0.0]);
        let times = [0.0, 1.0, 2.0];
        let out = integrate_rk4(|t, _| DVector::from_vec(vec![3.0 * t * t]), &y0, &times, 1).unwrap();
        assert!((out[2][0] - 8.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_inputs_and_blowups() {
        let y0 = DVector::from_vec(vec![1.0]);
        assert!(integrate_rk4(|_, y| y.clone(), &y0, &[], 1).is_err());
        assert!(integrate_rk4(|_, y| y.clone(), &y0, &[1.0, 0.0], 1).is_err());
        assert!(integrate_rk4(|_, y| y.clone(), &y0, &[0.0, 1.0], 0).is_err());

        let err = integrate_rk4(|_, _| DVector::from_vec(vec![f64::NAN]), &y0, &[0.0, 1.0], 1).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
