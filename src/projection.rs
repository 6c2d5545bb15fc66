// 📈 Markov Projector - iterate the chain forward into a loss curve

use crate::error::{PipelineError, PipelineResult};
use crate::matrix::{Distribution, TransitionMatrix};
use serde::{Deserialize, Serialize};

/// One projected period: the full state vector, the scalar mass in the
/// charged-off bucket, and the period-over-period delta of that mass.
/// Period 0 has no defined delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurvePoint {
    pub period: usize,
    pub state_probs: Vec<f64>,
    pub charged_off: f64,
    pub monthly_default_rate: Option<f64>,
}

/// The cumulative-gross-loss curve: periods 0..=horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionCurve {
    pub states: Vec<String>,
    pub points: Vec<CurvePoint>,
}

impl ProjectionCurve {
    pub fn charged_off_series(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.charged_off).collect()
    }

    pub fn first(&self) -> &CurvePoint {
        &self.points[0]
    }

    pub fn last(&self) -> &CurvePoint {
        self.points.last().expect("curve has at least one point")
    }

    /// Report-document rendering: `Period_i` → state probabilities plus
    /// the monthly default rate (null at period 0).
    pub fn to_json(&self) -> serde_json::Value {
        let mut outer = serde_json::Map::new();
        for point in &self.points {
            let mut inner = serde_json::Map::new();
            for (state, prob) in self.states.iter().zip(&point.state_probs) {
                inner.insert(state.clone(), serde_json::json!(prob));
            }
            inner.insert(
                "MONTHLY_DEFAULT_RATE".to_string(),
                serde_json::json!(point.monthly_default_rate),
            );
            outer.insert(
                format!("Period_{}", point.period),
                serde_json::Value::Object(inner),
            );
        }
        serde_json::Value::Object(outer)
    }
}

/// Project the distribution forward. Computes `horizon + 1` points
/// (periods 0..=horizon, period 0 being the initial distribution itself)
/// so a first difference exists for every configured projection period.
pub fn project(
    distribution: &Distribution,
    matrix: &TransitionMatrix,
    horizon: usize,
    charged_off: &str,
) -> PipelineResult<ProjectionCurve> {
    if distribution.states != matrix.states {
        return Err(PipelineError::computation(
            "projection",
            "distribution and matrix disagree on bucket ordering",
        ));
    }
    let co_index = matrix.index_of(charged_off).ok_or_else(|| {
        PipelineError::computation(
            "projection",
            format!("charged-off bucket '{}' is not a matrix state", charged_off),
        )
    })?;

    let mut points = Vec::with_capacity(horizon + 1);
    let mut current = distribution.shares.clone();
    let mut previous_co: Option<f64> = None;

    for period in 0..=horizon {
        if period > 0 {
            current = Distribution::step(&current, matrix);
        }
        let charged_off_mass = current[co_index];
        points.push(CurvePoint {
            period,
            state_probs: current.clone(),
            charged_off: charged_off_mass,
            monthly_default_rate: previous_co.map(|prev| charged_off_mass - prev),
        });
        previous_co = Some(charged_off_mass);
    }

    log::info!("projection curve computed for {} period(s)", points.len());
    Ok(ProjectionCurve {
        states: matrix.states.clone(),
        points,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_matrix() -> TransitionMatrix {
        TransitionMatrix {
            states: vec![
                "Current".to_string(),
                "30 DPD".to_string(),
                "Charged Off".to_string(),
            ],
            probs: vec![
                vec![0.75, 0.25, 0.0],
                vec![0.0, 0.0, 1.0],
                vec![0.0, 0.0, 1.0],
            ],
        }
    }

    fn scenario_distribution() -> Distribution {
        Distribution {
            states: vec![
                "Current".to_string(),
                "30 DPD".to_string(),
                "Charged Off".to_string(),
            ],
            shares: vec![1.0, 0.0, 0.0],
        }
    }

    #[test]
    fn test_horizon_plus_one_points() {
        let curve = project(&scenario_distribution(), &scenario_matrix(), 2, "Charged Off").unwrap();
        assert_eq!(curve.points.len(), 3);
        assert_eq!(curve.points[0].period, 0);
        assert_eq!(curve.points[2].period, 2);
    }

    #[test]
    fn test_period_zero_is_initial_distribution() {
        let curve = project(&scenario_distribution(), &scenario_matrix(), 2, "Charged Off").unwrap();
        assert_eq!(curve.points[0].state_probs, vec![1.0, 0.0, 0.0]);
        assert_eq!(curve.points[0].monthly_default_rate, None);
    }

    #[test]
    fn test_charged_off_mass_and_default_rate() {
        let curve = project(&scenario_distribution(), &scenario_matrix(), 2, "Charged Off").unwrap();
        let co = curve.charged_off_series();
        assert!((co[0] - 0.0).abs() < 1e-12);
        assert!((co[1] - 0.0).abs() < 1e-12);
        assert!((co[2] - 0.25).abs() < 1e-12);

        assert_eq!(curve.points[1].monthly_default_rate, Some(0.0));
        let mdr2 = curve.points[2].monthly_default_rate.unwrap();
        assert!((mdr2 - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_charged_off_mass_non_decreasing_when_absorbing() {
        let curve = project(&scenario_distribution(), &scenario_matrix(), 12, "Charged Off").unwrap();
        let co = curve.charged_off_series();
        for window in co.windows(2) {
            assert!(
                window[1] >= window[0] - 1e-12,
                "charged-off mass decreased: {:?}",
                window
            );
        }
    }

    #[test]
    fn test_unknown_charged_off_bucket_is_computation_error() {
        let err = project(&scenario_distribution(), &scenario_matrix(), 2, "Nope").unwrap_err();
        assert!(matches!(err, PipelineError::Computation { .. }));
    }

    #[test]
    fn test_curve_json_shape() {
        let curve = project(&scenario_distribution(), &scenario_matrix(), 1, "Charged Off").unwrap();
        let json = curve.to_json();
        assert_eq!(json["Period_0"]["Current"], serde_json::json!(1.0));
        assert_eq!(
            json["Period_0"]["MONTHLY_DEFAULT_RATE"],
            serde_json::Value::Null
        );
        assert_eq!(
            json["Period_1"]["MONTHLY_DEFAULT_RATE"],
            serde_json::json!(0.0)
        );
    }
}
