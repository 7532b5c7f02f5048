//! # Activation Controller
//!
//! Bounds how far a load follows references. The controller is a stack of
//! remaining depths: the base entry is the session's activation depth, each
//! followed reference pushes one less than the smaller of the field's bound
//! and the current top, and a top of zero means references are stubbed
//! instead of loaded.
//!
//! `UNBOUNDED_DEPTH` is absorbing: subtracting from it leaves it unbounded.

use crate::primitives::UNBOUNDED_DEPTH;

/// Stack of remaining activation depths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationController {
    stack: Vec<u32>,
}

impl Default for ActivationController {
    fn default() -> Self {
        Self::new(UNBOUNDED_DEPTH)
    }
}

impl ActivationController {
    #[must_use]
    pub fn new(base: u32) -> Self {
        Self { stack: vec![base] }
    }

    /// Remaining depth at the current position.
    #[must_use]
    pub fn current(&self) -> u32 {
        self.stack.last().copied().unwrap_or(0)
    }

    /// The depth a top-level load starts with.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.stack.first().copied().unwrap_or(0)
    }

    /// Replace the base depth and drop any nested entries.
    pub fn set_base(&mut self, base: u32) {
        self.stack.clear();
        self.stack.push(base);
    }

    /// Drop nested entries left by an interrupted load.
    pub fn reset(&mut self) {
        self.stack.truncate(1);
    }

    /// Enter a reference whose field allows `bound` levels. The target
    /// itself uses one level of both the bound and the current depth.
    /// Returns the depth that now applies below the target.
    ///
    /// Callers stub the reference instead when the current depth or the
    /// bound is zero.
    pub fn enter(&mut self, bound: u32) -> u32 {
        let depth = below(bound).min(below(self.current()));
        self.stack.push(depth);
        depth
    }

    /// Leave the innermost reference. The base entry is never removed.
    pub fn leave(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    /// Number of references currently entered.
    #[must_use]
    pub fn nesting(&self) -> usize {
        self.stack.len().saturating_sub(1)
    }
}

/// One level less, keeping `UNBOUNDED_DEPTH` unbounded.
fn below(depth: u32) -> u32 {
    if depth == UNBOUNDED_DEPTH {
        UNBOUNDED_DEPTH
    } else {
        depth.saturating_sub(1)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_never_increases() {
        let mut controller = ActivationController::new(2);
        assert_eq!(controller.enter(10), 1);
        assert_eq!(controller.enter(10), 0);
        assert_eq!(controller.enter(10), 0);
        assert_eq!(controller.current(), 0);
    }

    #[test]
    fn strategy_bound_can_lower_depth() {
        let mut controller = ActivationController::default();
        assert_eq!(controller.enter(2), 1);
        assert_eq!(controller.enter(UNBOUNDED_DEPTH), 0);
        controller.reset();
        assert_eq!(controller.enter(1), 0);
    }

    #[test]
    fn unbounded_stays_unbounded() {
        let mut controller = ActivationController::default();
        assert_eq!(controller.enter(UNBOUNDED_DEPTH), UNBOUNDED_DEPTH);
        assert_eq!(controller.current(), UNBOUNDED_DEPTH);
    }

    #[test]
    fn leave_keeps_base() {
        let mut controller = ActivationController::new(3);
        controller.enter(3);
        controller.leave();
        controller.leave();
        assert_eq!(controller.current(), 3);
        assert_eq!(controller.nesting(), 0);
    }

    #[test]
    fn reset_drops_nested_entries() {
        let mut controller = ActivationController::new(4);
        controller.enter(2);
        controller.enter(2);
        controller.reset();
        assert_eq!(controller.current(), 4);
        controller.set_base(0);
        assert_eq!(controller.base(), 0);
    }
}
