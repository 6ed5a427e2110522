//! State manager: the authority on legal workflow and execution state
//! transitions, plus an in-memory append-only transition log.
//!
//! Every status change in the system is proposed here first; the service
//! layer records the old status, applies the new one, and only then persists.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ExecutionStatus, WorkflowStatus};
use crate::EngineError;

/// Which entity a transition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Workflow,
    Execution,
}

/// One recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub from_status: String,
    pub to_status: String,
    pub reason: String,
    pub operator: String,
    pub timestamp: DateTime<Utc>,
}

/// Holds the transition tables (immutable after construction, so validation
/// never blocks) and the transition log behind a reader/writer lock.
pub struct StateManager {
    workflow_transitions: HashMap<WorkflowStatus, Vec<WorkflowStatus>>,
    execution_transitions: HashMap<ExecutionStatus, Vec<ExecutionStatus>>,
    history: RwLock<Vec<StateTransition>>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        use ExecutionStatus as E;
        use WorkflowStatus as W;

        let workflow_transitions = HashMap::from([
            (W::Inactive, vec![W::Active, W::Disabled]),
            (W::Active, vec![W::Inactive, W::Paused, W::Disabled]),
            (W::Paused, vec![W::Active, W::Inactive, W::Disabled]),
            (W::Disabled, vec![W::Inactive]),
        ]);

        // `timeout` and `archived` have no entries: nothing moves in or out
        // of them through the state manager.
        let execution_transitions = HashMap::from([
            (E::Pending, vec![E::Running, E::Cancelled]),
            (E::Running, vec![E::Completed, E::Failed, E::Cancelled]),
            (E::Failed, vec![E::Pending]),
            (E::Completed, vec![]),
            (E::Cancelled, vec![]),
        ]);

        Self {
            workflow_transitions,
            execution_transitions,
            history: RwLock::new(Vec::new()),
        }
    }

    // ------ Validation ------

    pub fn validate_workflow_transition(
        &self,
        from: WorkflowStatus,
        to: WorkflowStatus,
    ) -> Result<(), EngineError> {
        let allowed = self.workflow_transitions.get(&from);
        match allowed {
            Some(targets) if targets.contains(&to) => Ok(()),
            _ => Err(EngineError::InvalidTransition {
                entity: "workflow",
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }

    pub fn validate_execution_transition(
        &self,
        from: ExecutionStatus,
        to: ExecutionStatus,
    ) -> Result<(), EngineError> {
        let allowed = self.execution_transitions.get(&from);
        match allowed {
            Some(targets) if targets.contains(&to) => Ok(()),
            _ => Err(EngineError::InvalidTransition {
                entity: "execution",
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }

    // ------ Recording ------

    /// Validate, then append to the log.
    pub fn record_workflow_transition(
        &self,
        workflow_id: &str,
        from: WorkflowStatus,
        to: WorkflowStatus,
        reason: &str,
        operator: &str,
    ) -> Result<(), EngineError> {
        self.validate_workflow_transition(from, to)?;
        self.append(EntityKind::Workflow, workflow_id, from.to_string(), to.to_string(), reason, operator);
        Ok(())
    }

    /// Validate, then append to the log.
    pub fn record_execution_transition(
        &self,
        execution_id: &str,
        from: ExecutionStatus,
        to: ExecutionStatus,
        reason: &str,
        operator: &str,
    ) -> Result<(), EngineError> {
        self.validate_execution_transition(from, to)?;
        self.append(EntityKind::Execution, execution_id, from.to_string(), to.to_string(), reason, operator);
        Ok(())
    }

    fn append(
        &self,
        entity_kind: EntityKind,
        entity_id: &str,
        from_status: String,
        to_status: String,
        reason: &str,
        operator: &str,
    ) {
        let transition = StateTransition {
            entity_kind,
            entity_id: entity_id.to_string(),
            from_status,
            to_status,
            reason: reason.to_string(),
            operator: operator.to_string(),
            timestamp: Utc::now(),
        };
        self.history.write().unwrap().push(transition);
    }

    // ------ Queries ------

    pub fn allowed_workflow_transitions(&self, from: WorkflowStatus) -> Vec<WorkflowStatus> {
        self.workflow_transitions
            .get(&from)
            .cloned()
            .unwrap_or_default()
    }

    pub fn allowed_execution_transitions(&self, from: ExecutionStatus) -> Vec<ExecutionStatus> {
        self.execution_transitions
            .get(&from)
            .cloned()
            .unwrap_or_default()
    }

    /// A status is terminal when its entry in the table has no targets.
    pub fn is_workflow_terminal(&self, status: WorkflowStatus) -> bool {
        self.workflow_transitions
            .get(&status)
            .map(|targets| targets.is_empty())
            .unwrap_or(false)
    }

    pub fn is_execution_terminal(&self, status: ExecutionStatus) -> bool {
        self.execution_transitions
            .get(&status)
            .map(|targets| targets.is_empty())
            .unwrap_or(false)
    }

    /// The transition log, optionally filtered by kind and/or entity id,
    /// in insertion order.
    pub fn history(&self, kind: Option<EntityKind>, entity_id: Option<&str>) -> Vec<StateTransition> {
        self.history
            .read()
            .unwrap()
            .iter()
            .filter(|t| kind.map(|k| t.entity_kind == k).unwrap_or(true))
            .filter(|t| entity_id.map(|id| t.entity_id == id).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Drop log entries at or before the cutoff; returns how many were
    /// removed.
    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut history = self.history.write().unwrap();
        let before = history.len();
        history.retain(|t| t.timestamp > cutoff);
        before - history.len()
    }

    /// Transition counts per target status, split by entity kind.
    pub fn statistics(&self) -> StateStatistics {
        let history = self.history.read().unwrap();
        let mut stats = StateStatistics {
            total_transitions: history.len(),
            ..StateStatistics::default()
        };
        for transition in history.iter() {
            let bucket = match transition.entity_kind {
                EntityKind::Workflow => &mut stats.workflow_transitions,
                EntityKind::Execution => &mut stats.execution_transitions,
            };
            *bucket.entry(transition.to_status.clone()).or_insert(0) += 1;
        }
        stats
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StateStatistics {
    pub total_transitions: usize,
    pub workflow_transitions: HashMap<String, usize>,
    pub execution_transitions: HashMap<String, usize>,
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use ExecutionStatus as E;
    use WorkflowStatus as W;

    #[test]
    fn workflow_table_matches_the_law() {
        let sm = StateManager::new();
        let legal = [
            (W::Inactive, W::Active),
            (W::Inactive, W::Disabled),
            (W::Active, W::Inactive),
            (W::Active, W::Paused),
            (W::Active, W::Disabled),
            (W::Paused, W::Active),
            (W::Paused, W::Inactive),
            (W::Paused, W::Disabled),
            (W::Disabled, W::Inactive),
        ];
        for (from, to) in legal {
            assert!(sm.validate_workflow_transition(from, to).is_ok(), "{from} -> {to}");
        }
        let illegal = [
            (W::Inactive, W::Paused),
            (W::Disabled, W::Active),
            (W::Disabled, W::Paused),
            (W::Active, W::Active),
        ];
        for (from, to) in illegal {
            assert!(sm.validate_workflow_transition(from, to).is_err(), "{from} -> {to}");
        }
    }

    #[test]
    fn execution_table_matches_the_law() {
        let sm = StateManager::new();
        let legal = [
            (E::Pending, E::Running),
            (E::Pending, E::Cancelled),
            (E::Running, E::Completed),
            (E::Running, E::Failed),
            (E::Running, E::Cancelled),
            (E::Failed, E::Pending),
        ];
        for (from, to) in legal {
            assert!(sm.validate_execution_transition(from, to).is_ok(), "{from} -> {to}");
        }
        let illegal = [
            (E::Completed, E::Running),
            (E::Cancelled, E::Pending),
            (E::Pending, E::Completed),
            (E::Running, E::Pending),
            (E::Timeout, E::Pending),
            (E::Archived, E::Pending),
        ];
        for (from, to) in illegal {
            assert!(sm.validate_execution_transition(from, to).is_err(), "{from} -> {to}");
        }
    }

    #[test]
    fn terminal_statuses() {
        let sm = StateManager::new();
        assert!(sm.is_execution_terminal(E::Completed));
        assert!(sm.is_execution_terminal(E::Cancelled));
        assert!(!sm.is_execution_terminal(E::Failed));
        assert!(!sm.is_execution_terminal(E::Pending));
        // Absent from the table entirely, so not reported terminal either.
        assert!(!sm.is_execution_terminal(E::Timeout));
        assert!(!sm.is_workflow_terminal(W::Disabled));
    }

    #[test]
    fn record_appends_and_rejects_illegal() {
        let sm = StateManager::new();
        sm.record_workflow_transition("wf-1", W::Inactive, W::Active, "activated", "tester")
            .unwrap();
        sm.record_execution_transition("ex-1", E::Pending, E::Running, "started", "tester")
            .unwrap();

        let err = sm
            .record_execution_transition("ex-1", E::Completed, E::Running, "nope", "tester")
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        // Only the two legal transitions were recorded.
        assert_eq!(sm.history(None, None).len(), 2);
        assert_eq!(sm.history(Some(EntityKind::Workflow), None).len(), 1);
        assert_eq!(sm.history(None, Some("ex-1")).len(), 1);
    }

    #[test]
    fn cleanup_drops_old_entries() {
        let sm = StateManager::new();
        sm.record_workflow_transition("wf-1", W::Inactive, W::Active, "", "")
            .unwrap();
        let removed = sm.cleanup_before(Utc::now());
        assert_eq!(removed, 1);
        assert!(sm.history(None, None).is_empty());
    }

    #[test]
    fn statistics_counts_by_target() {
        let sm = StateManager::new();
        sm.record_workflow_transition("wf-1", W::Inactive, W::Active, "", "")
            .unwrap();
        sm.record_workflow_transition("wf-2", W::Inactive, W::Active, "", "")
            .unwrap();
        let stats = sm.statistics();
        assert_eq!(stats.total_transitions, 2);
        assert_eq!(stats.workflow_transitions["active"], 2);
    }
}
