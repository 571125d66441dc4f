//! Deterministic next-best-view selection.

use crate::core::types::ReturnSummary;

/// Winner of a selection round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    /// Position of the winner in the scanned slice.
    pub position: usize,
    pub summary: ReturnSummary,
}

/// Pick the candidate with the highest return.
///
/// `returns[i]` is `None` for candidates that are not viable this round. The
/// scan is left to right with a strict `>` comparison, so ties keep the earlier
/// candidate. Returns `None` when no candidate is viable.
///
/// The winning margin is measured against the true second-best return, not
/// against whichever candidate led before the winner was found. For
/// `[10, 7, 3]` the margin is 3; a "previous leader" rule would report 0.
pub fn select_best(returns: &[Option<f64>]) -> Option<Selection> {
    let mut best: Option<(usize, f64)> = None;
    let mut runner_up: Option<f64> = None;

    for (position, value) in returns.iter().enumerate() {
        let Some(value) = *value else {
            continue;
        };
        match best {
            None => best = Some((position, value)),
            Some((_, best_value)) if value > best_value => {
                runner_up = Some(best_value);
                best = Some((position, value));
            }
            Some(_) => {
                if runner_up.is_none_or(|second| value > second) {
                    runner_up = Some(value);
                }
            }
        }
    }

    let (position, best_return) = best?;
    let viable: Vec<f64> = returns.iter().flatten().copied().collect();
    let (mean, stddev) = mean_and_stddev(&viable);
    Some(Selection {
        position,
        summary: ReturnSummary {
            best_return,
            winning_margin: runner_up.map_or(0.0, |second| best_return - second),
            mean,
            stddev,
        },
    })
}

/// Population mean and standard deviation; `(0, 0)` for an empty slice.
fn mean_and_stddev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
