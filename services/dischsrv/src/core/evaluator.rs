//! Stop-condition evaluation

use super::profile::Step;

/// Decides when the active step is finished
#[derive(Debug, Default, Clone, Copy)]
pub struct StepEvaluator;

impl StepEvaluator {
    /// A step completes once the monitored quantity falls to its threshold
    ///
    /// `monitored` is the voltage for a voltage condition and the current
    /// otherwise; the caller picks it through the measurement source.
    pub fn is_step_complete(step: &Step, monitored: f64) -> bool {
        monitored <= step.stop_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profile::{StepType, StopCondition};

    #[test]
    fn test_completes_exactly_at_threshold() {
        let step = Step::new(StepType::CC, 10.0, StopCondition::Voltage, 300.0);
        assert!(!StepEvaluator::is_step_complete(&step, 300.01));
        assert!(StepEvaluator::is_step_complete(&step, 300.0));
        assert!(StepEvaluator::is_step_complete(&step, 299.99));
    }

    #[test]
    fn test_current_condition() {
        let step = Step::new(StepType::CV, 380.0, StopCondition::Current, 0.5);
        assert!(!StepEvaluator::is_step_complete(&step, 0.51));
        assert!(StepEvaluator::is_step_complete(&step, 0.5));
    }

    #[test]
    fn test_nan_never_completes() {
        let step = Step::new(StepType::CC, 10.0, StopCondition::Voltage, 300.0);
        assert!(!StepEvaluator::is_step_complete(&step, f64::NAN));
    }
}
