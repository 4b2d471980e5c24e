use crate::error::{Error, ScopeKind};
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Lifecycle of a project or test-case environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Created,
    Running,
    Closed,
}

impl ScopeState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    scope: ScopeKind,
    state: Mutex<ScopeState>,
}

impl Lifecycle {
    pub(crate) fn new(scope: ScopeKind) -> Self {
        Self {
            scope,
            state: Mutex::new(ScopeState::Created),
        }
    }

    pub(crate) fn get(&self) -> ScopeState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Created -> Running`. The transition happens before provisioning so a
    /// half-provisioned scope can still be closed.
    pub(crate) fn begin_run(&self) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != ScopeState::Created {
            return Err(Error::InvalidState {
                scope: self.scope,
                state: state.as_str(),
                expected: ScopeState::Created.as_str(),
            });
        }
        *state = ScopeState::Running;
        Ok(())
    }

    /// Moves to `Closed`; `false` if it already was
    pub(crate) fn begin_close(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let was_open = *state != ScopeState::Closed;
        *state = ScopeState::Closed;
        was_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_only_from_created() {
        let lifecycle = Lifecycle::new(ScopeKind::Project);
        assert_eq!(lifecycle.get(), ScopeState::Created);

        lifecycle.begin_run().unwrap();
        assert_eq!(lifecycle.get(), ScopeState::Running);

        let err = lifecycle.begin_run().unwrap_err();
        assert_eq!(
            err.to_string(),
            "project environment is running, expected created"
        );
    }

    #[test]
    fn close_is_idempotent() {
        let lifecycle = Lifecycle::new(ScopeKind::TestCase);
        lifecycle.begin_run().unwrap();

        assert!(lifecycle.begin_close());
        assert!(!lifecycle.begin_close());
        assert_eq!(lifecycle.get(), ScopeState::Closed);
        assert!(lifecycle.begin_run().is_err());
    }
}
