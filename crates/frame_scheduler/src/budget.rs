pub const DEFAULT_BUDGET_MILLIS: f64 = 8.0;

/// How many milliseconds of GPU time one accumulation call may spend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BudgetPolicy {
    Fixed { millis: f64 },
    /// A fraction of the display refresh interval. Falls back to
    /// [`DEFAULT_BUDGET_MILLIS`] when the refresh rate is unknown.
    RefreshRate { fraction: f64 },
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self::Fixed {
            millis: DEFAULT_BUDGET_MILLIS,
        }
    }
}

impl BudgetPolicy {
    pub fn budget_millis(self, refresh_rate_millihertz: Option<u32>) -> f64 {
        match self {
            BudgetPolicy::Fixed { millis } => millis,
            BudgetPolicy::RefreshRate { fraction } => match refresh_rate_millihertz {
                Some(millihertz) if millihertz > 0 => {
                    let refresh_interval_millis = 1_000_000.0 / f64::from(millihertz);
                    refresh_interval_millis * fraction
                }
                _ => DEFAULT_BUDGET_MILLIS,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_budget_ignores_refresh_rate() {
        let policy = BudgetPolicy::Fixed { millis: 12.5 };
        assert_eq!(policy.budget_millis(None), 12.5);
        assert_eq!(policy.budget_millis(Some(144_000)), 12.5);
    }

    #[test]
    fn refresh_budget_scales_the_refresh_interval() {
        let policy = BudgetPolicy::RefreshRate { fraction: 0.5 };
        let budget = policy.budget_millis(Some(60_000));
        assert!((budget - 1000.0 / 120.0).abs() < 1e-9);
    }

    #[test]
    fn refresh_budget_falls_back_without_a_refresh_rate() {
        let policy = BudgetPolicy::RefreshRate { fraction: 0.5 };
        assert_eq!(policy.budget_millis(None), DEFAULT_BUDGET_MILLIS);
        assert_eq!(policy.budget_millis(Some(0)), DEFAULT_BUDGET_MILLIS);
    }
}
