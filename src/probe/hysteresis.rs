use crate::DeviceStatus;

/// Result of feeding one probe into the flap filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeEvaluation {
    /// Reachable and nothing to report
    Ok,
    /// Failed, but the failure count has not reached `down_count` yet
    Falling,
    /// Failure count just reached `down_count`
    GoesDown,
    /// Still unreachable after being declared down
    StillDown,
    /// First reachable probe after being declared down
    Recovered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluated {
    pub evaluation: ProbeEvaluation,
    pub status: DeviceStatus,
    pub failures: u32,
}

impl ProbeEvaluation {
    pub fn evaluate(
        current: DeviceStatus,
        failures: u32,
        reachable: bool,
        down_count: u32,
    ) -> Evaluated {
        if reachable {
            // one good probe is enough to come back
            let evaluation = match current {
                DeviceStatus::Offline => ProbeEvaluation::Recovered,
                DeviceStatus::Online | DeviceStatus::Unknown => ProbeEvaluation::Ok,
            };
            return Evaluated {
                evaluation,
                status: DeviceStatus::Online,
                failures: 0,
            };
        }

        let failures = failures.saturating_add(1);

        if current == DeviceStatus::Offline {
            return Evaluated {
                evaluation: ProbeEvaluation::StillDown,
                status: DeviceStatus::Offline,
                failures,
            };
        }

        if failures >= down_count {
            return Evaluated {
                evaluation: ProbeEvaluation::GoesDown,
                status: DeviceStatus::Offline,
                failures,
            };
        }

        Evaluated {
            evaluation: ProbeEvaluation::Falling,
            status: current,
            failures,
        }
    }

    /// Whether this evaluation is worth an alert
    pub fn is_transition(&self) -> bool {
        matches!(self, ProbeEvaluation::GoesDown | ProbeEvaluation::Recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goes_down_only_at_threshold() {
        let mut status = DeviceStatus::Online;
        let mut failures = 0;

        for _ in 0..2 {
            let out = ProbeEvaluation::evaluate(status, failures, false, 3);
            assert_eq!(out.evaluation, ProbeEvaluation::Falling);
            assert_eq!(out.status, DeviceStatus::Online);
            status = out.status;
            failures = out.failures;
        }

        let out = ProbeEvaluation::evaluate(status, failures, false, 3);
        assert_eq!(out.evaluation, ProbeEvaluation::GoesDown);
        assert_eq!(out.status, DeviceStatus::Offline);
        assert_eq!(out.failures, 3);

        let out = ProbeEvaluation::evaluate(out.status, out.failures, false, 3);
        assert_eq!(out.evaluation, ProbeEvaluation::StillDown);
    }

    #[test]
    fn test_single_success_recovers() {
        let out = ProbeEvaluation::evaluate(DeviceStatus::Offline, 9, true, 3);
        assert_eq!(out.evaluation, ProbeEvaluation::Recovered);
        assert_eq!(out.status, DeviceStatus::Online);
        assert_eq!(out.failures, 0);
    }

    #[test]
    fn test_success_resets_falling_counter() {
        let out = ProbeEvaluation::evaluate(DeviceStatus::Online, 2, true, 3);
        assert_eq!(out.evaluation, ProbeEvaluation::Ok);
        assert_eq!(out.failures, 0);
    }

    #[test]
    fn test_unknown_comes_online_silently() {
        let out = ProbeEvaluation::evaluate(DeviceStatus::Unknown, 0, true, 3);
        assert_eq!(out.status, DeviceStatus::Online);
        assert!(!out.evaluation.is_transition());
    }

    #[test]
    fn test_unknown_follows_down_count() {
        let out = ProbeEvaluation::evaluate(DeviceStatus::Unknown, 0, false, 3);
        assert_eq!(out.status, DeviceStatus::Unknown);

        let out = ProbeEvaluation::evaluate(DeviceStatus::Unknown, 2, false, 3);
        assert_eq!(out.evaluation, ProbeEvaluation::GoesDown);
    }

    #[test]
    fn test_down_count_of_one_is_immediate() {
        let out = ProbeEvaluation::evaluate(DeviceStatus::Online, 0, false, 1);
        assert_eq!(out.evaluation, ProbeEvaluation::GoesDown);
    }
}
