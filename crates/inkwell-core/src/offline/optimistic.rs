//! Reversible state updates applied ahead of confirmation.

type Step<S> = Box<dyn FnOnce(&mut S) + Send>;

/// A forward change paired with its inverse
pub struct OptimisticUpdate<S> {
    apply: Step<S>,
    revert: Step<S>,
}

/// Handle for undoing an applied [`OptimisticUpdate`]
#[must_use = "dropping the rollback keeps the optimistic change"]
pub struct Rollback<S> {
    revert: Step<S>,
}

impl<S> OptimisticUpdate<S> {
    pub fn new(
        apply: impl FnOnce(&mut S) + Send + 'static,
        revert: impl FnOnce(&mut S) + Send + 'static,
    ) -> Self {
        Self {
            apply: Box::new(apply),
            revert: Box::new(revert),
        }
    }

    /// Apply the forward change, returning the inverse
    pub fn apply(self, state: &mut S) -> Rollback<S> {
        (self.apply)(state);
        Rollback {
            revert: self.revert,
        }
    }
}

impl<S> Rollback<S> {
    pub fn rollback(self, state: &mut S) {
        (self.revert)(state);
    }
}
