//! Server-side view of the browser alarm.
//!
//! The page raises its banner when a level is strictly above the threshold and
//! clears it at or below. The relay tracks the same rule so alarm edges show up
//! in logs and metrics; it never changes what gets broadcast.

use crate::transform::StockLevel;

pub const DEFAULT_THRESHOLD: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlarmTransition {
    Raised(StockLevel),
    Cleared(StockLevel),
}

#[derive(Debug)]
pub struct AlarmMonitor {
    threshold: f64,
    raised: bool,
}

impl AlarmMonitor {
    pub fn new(threshold: f64) -> Self {
        Self { threshold, raised: false }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_raised(&self) -> bool {
        self.raised
    }

    /// Feed one level; returns the edge if the alarm state flipped.
    pub fn observe(&mut self, level: StockLevel) -> Option<AlarmTransition> {
        let above = level.value() > self.threshold;
        match (self.raised, above) {
            (false, true) => {
                self.raised = true;
                Some(AlarmTransition::Raised(level))
            }
            (true, false) => {
                self.raised = false;
                Some(AlarmTransition::Cleared(level))
            }
            _ => None,
        }
    }
}

impl Default for AlarmMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_and_clear() {
        let mut alarm = AlarmMonitor::default();
        assert_eq!(alarm.observe(StockLevel(2.5)), Some(AlarmTransition::Raised(StockLevel(2.5))));
        assert!(alarm.is_raised());
        assert_eq!(alarm.observe(StockLevel(1.5)), Some(AlarmTransition::Cleared(StockLevel(1.5))));
        assert!(!alarm.is_raised());
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut alarm = AlarmMonitor::default();
        assert_eq!(alarm.observe(StockLevel(2.0)), None);
        assert!(!alarm.is_raised());
        alarm.observe(StockLevel(2.01));
        assert_eq!(alarm.observe(StockLevel(2.0)), Some(AlarmTransition::Cleared(StockLevel(2.0))));
    }

    #[test]
    fn test_repeated_levels_emit_once() {
        let mut alarm = AlarmMonitor::new(1.0);
        assert!(alarm.observe(StockLevel(3.0)).is_some());
        assert_eq!(alarm.observe(StockLevel(3.0)), None);
        assert_eq!(alarm.observe(StockLevel(4.0)), None);
        assert!(alarm.observe(StockLevel(0.5)).is_some());
        assert_eq!(alarm.observe(StockLevel(-1.0)), None);
    }
}
