//! Pluggable termination criteria for the planning loop.

use crate::core::types::ReturnSummary;

/// Data available to a termination criterion after a round was recorded.
#[derive(Debug, Clone, Copy)]
pub struct TerminationInput<'a> {
    /// Number of rounds recorded so far, including this one.
    pub iteration: u32,
    pub summary: &'a ReturnSummary,
    /// Movement cost of the selected view.
    pub cost: f64,
    /// Information gain of the selected view (empty if unavailable).
    pub information: &'a [f64],
}

/// Decides whether the reconstruction is complete.
pub trait TerminationCriterion {
    fn should_terminate(&self, input: &TerminationInput<'_>) -> bool;
}

/// Never terminates; only a stop command ends the loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverTerminate;

impl TerminationCriterion for NeverTerminate {
    fn should_terminate(&self, _input: &TerminationInput<'_>) -> bool {
        false
    }
}

/// Terminates once the given number of rounds has been recorded.
#[derive(Debug, Clone, Copy)]
pub struct IterationLimit(pub u32);

impl TerminationCriterion for IterationLimit {
    fn should_terminate(&self, input: &TerminationInput<'_>) -> bool {
        input.iteration >= self.0
    }
}

impl<T: TerminationCriterion + ?Sized> TerminationCriterion for Box<T> {
    fn should_terminate(&self, input: &TerminationInput<'_>) -> bool {
        (**self).should_terminate(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(iteration: u32, summary: &ReturnSummary) -> TerminationInput<'_> {
        TerminationInput {
            iteration,
            summary,
            cost: 0.0,
            information: &[],
        }
    }

    #[test]
    fn never_terminate_ignores_saturation() {
        let summary = ReturnSummary::default();
        assert!(!NeverTerminate.should_terminate(&input(1_000_000, &summary)));
    }

    #[test]
    fn iteration_limit_stops_at_count() {
        let summary = ReturnSummary::default();
        let limit = IterationLimit(3);
        assert!(!limit.should_terminate(&input(2, &summary)));
        assert!(limit.should_terminate(&input(3, &summary)));
    }

    #[test]
    fn boxed_criterion_delegates() {
        let summary = ReturnSummary::default();
        let boxed: Box<dyn TerminationCriterion> = Box::new(IterationLimit(1));
        assert!(boxed.should_terminate(&input(1, &summary)));
    }
}
