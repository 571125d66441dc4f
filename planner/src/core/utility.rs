//! Utility ("return") of moving to a candidate view.

/// Weights combining movement cost and information gain into one score.
#[derive(Debug, Clone, PartialEq)]
pub struct UtilityWeights {
    pub cost: f64,
    /// One weight per information metric, in metric order.
    pub information: Vec<f64>,
}

/// Information vector had more entries than there are weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightMismatch {
    pub weights: usize,
    pub values: usize,
}

/// Return of a single candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewReturn {
    pub value: f64,
    /// Set when the information term was dropped because of a length mismatch.
    pub mismatch: Option<WeightMismatch>,
}

/// `-cost_weight * cost + sum(weight_i * info_i)`.
///
/// Missing information contributes nothing. An information vector longer than
/// the weight vector is rejected as a whole and only the cost term is kept.
pub fn compute_return(cost: f64, information: Option<&[f64]>, weights: &UtilityWeights) -> ViewReturn {
    let cost_term = -weights.cost * cost;
    let Some(values) = information else {
        return ViewReturn {
            value: cost_term,
            mismatch: None,
        };
    };

    if values.len() > weights.information.len() {
        return ViewReturn {
            value: cost_term,
            mismatch: Some(WeightMismatch {
                weights: weights.information.len(),
                values: values.len(),
            }),
        };
    }

    let gain: f64 = values
        .iter()
        .zip(&weights.information)
        .map(|(value, weight)| value * weight)
        .sum();
    ViewReturn {
        value: cost_term + gain,
        mismatch: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(cost: f64, information: &[f64]) -> UtilityWeights {
        UtilityWeights {
            cost,
            information: information.to_vec(),
        }
    }

    #[test]
    fn combines_cost_and_weighted_information() {
        let w = weights(1.0, &[2.0]);
        assert_eq!(compute_return(1.0, Some(&[5.0]), &w).value, 9.0);
        assert_eq!(compute_return(2.0, Some(&[10.0]), &w).value, 18.0);
    }

    #[test]
    fn shorter_information_uses_leading_weights() {
        let w = weights(0.5, &[1.0, 3.0, 100.0]);
        let ret = compute_return(4.0, Some(&[1.0, 1.0]), &w);
        assert_eq!(ret.value, -2.0 + 1.0 + 3.0);
        assert_eq!(ret.mismatch, None);
    }

    #[test]
    fn missing_information_is_cost_only() {
        let w = weights(2.0, &[1.0]);
        assert_eq!(compute_return(3.0, None, &w).value, -6.0);
    }

    #[test]
    fn overlong_information_falls_back_to_cost_term() {
        let w = weights(1.0, &[1.0]);
        let ret = compute_return(2.0, Some(&[10.0, 10.0]), &w);
        assert_eq!(ret.value, -2.0);
        assert_eq!(
            ret.mismatch,
            Some(WeightMismatch {
                weights: 1,
                values: 2
            })
        );
    }
}
