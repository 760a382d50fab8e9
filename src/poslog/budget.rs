//! Byte budget for buffered position data.

/// Tracks bytes buffered in memory against a ceiling.
///
/// Owned by one [`TermPositionIndex`], so independent indexes have
/// independent budgets. The counter only observes; the owner decides
/// when and what to flush.
///
/// [`TermPositionIndex`]: crate::poslog::TermPositionIndex
#[derive(Debug, Clone)]
pub struct MemoryBudget {
    ceiling: u64,
    used: u64,
}

impl MemoryBudget {
    /// Create a budget with the given ceiling in bytes.
    pub fn new(ceiling: u64) -> Self {
        MemoryBudget { ceiling, used: 0 }
    }

    /// The ceiling in bytes.
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Bytes currently charged.
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Whether usage exceeds the ceiling.
    pub fn over(&self) -> bool {
        self.used > self.ceiling
    }

    /// Charge bytes against the budget.
    pub fn charge(&mut self, bytes: u64) {
        self.used += bytes;
    }

    /// Release previously charged bytes.
    pub fn release(&mut self, bytes: u64) {
        debug_assert!(self.used >= bytes, "released more than was charged");
        self.used = self.used.saturating_sub(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_release_balance() {
        let mut budget = MemoryBudget::new(100);
        assert!(!budget.over());

        budget.charge(60);
        budget.charge(60);
        assert_eq!(budget.used(), 120);
        assert!(budget.over());

        budget.release(30);
        assert_eq!(budget.used(), 90);
        assert!(!budget.over());
    }

    #[test]
    fn test_usage_at_ceiling_is_not_over() {
        let mut budget = MemoryBudget::new(10);
        budget.charge(10);
        assert!(!budget.over());
        budget.charge(1);
        assert!(budget.over());
    }
}
