//! The workstation state transition table (spec §4.F).
//!
//! Lives in `stationd-core` rather than `stationd-lifecycle` so the
//! scheduler can consult it synchronously during admission (spec §4.E)
//! without depending on the lifecycle engine, which itself depends on the
//! scheduler for `OperationExecutor`/`ExecutionHandle`.

use crate::domain::{OperationKind, WorkstationState};
use crate::{ErrorKind, Result, StationError};

/// `(transitional, terminal)` states for `kind` applied to a workstation
/// currently in `current`, or a conflict error naming why it is illegal.
pub fn legal_transition(current: WorkstationState, kind: OperationKind) -> Result<(WorkstationState, WorkstationState)> {
    use OperationKind as K;
    use WorkstationState as S;

    let pair = match (kind, current) {
        (K::Start, S::Stopped) => Some((S::Resuming, S::Running)),
        (K::Resume, S::Hibernated) => Some((S::Resuming, S::Running)),
        (K::Stop, S::Running) => Some((S::Stopping, S::Stopped)),
        (K::Hibernate, S::Running) => Some((S::Hibernating, S::Hibernated)),
        (K::Resize, S::Running) => Some((S::Resizing, S::Running)),
        (K::Resize, S::Stopped) => Some((S::Resizing, S::Stopped)),
        (K::Delete, S::Running)
        | (K::Delete, S::Stopped)
        | (K::Delete, S::Hibernated)
        | (K::Delete, S::Error) => Some((S::Deleting, S::Deleted)),
        _ => None,
    };

    pair.ok_or_else(|| {
        StationError::new(
            ErrorKind::Conflict,
            format!("{kind} is not a legal transition from state {current}"),
        )
        .with_remediation(format!("workstation must be in a compatible state for {kind}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_from_running_is_legal() {
        let (transitional, terminal) = legal_transition(WorkstationState::Running, OperationKind::Stop).unwrap();
        assert_eq!(transitional, WorkstationState::Stopping);
        assert_eq!(terminal, WorkstationState::Stopped);
    }

    #[test]
    fn hibernate_from_stopped_is_illegal() {
        let err = legal_transition(WorkstationState::Stopped, OperationKind::Hibernate).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[test]
    fn resume_only_from_hibernated() {
        assert!(legal_transition(WorkstationState::Running, OperationKind::Resume).is_err());
        assert!(legal_transition(WorkstationState::Hibernated, OperationKind::Resume).is_ok());
    }
}
