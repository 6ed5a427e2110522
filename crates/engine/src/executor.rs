//! The DAG execution engine.
//!
//! One engine hosts many concurrent executions up to a configurable cap.
//! Each admitted execution owns a dependency map derived from the workflow's
//! enabled edges, a bounded ready channel whose capacity equals the node
//! count, a small pool of worker tasks draining that channel, and a
//! cancellation token derived from the engine's root token.
//!
//! The engine never touches persistence: when an execution terminates it
//! emits an [`ExecutionReport`] on the completion channel handed out by
//! [`WorkflowEngine::new`], and the execution service does the state
//! transitions, record write-back, and statistics update.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use nodes::{NodeInput, NodeOutput, NodeRegistry, ValueMap};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::condition;
use crate::models::{
    Execution, ExecutionMetrics, ExecutionNodeRecord, ExecutionStatus, Node, NodeRunStatus,
    Workflow,
};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Admission cap across all workflows.
    pub max_concurrent_executions: usize,
    /// Worker tasks per execution.
    pub workers_per_execution: usize,
    /// Fallback per-node timeout when neither the node nor the workflow
    /// config sets one.
    pub default_node_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 10,
            workers_per_execution: 3,
            default_node_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Stopped,
    Running,
    Stopping,
}

// ---------------------------------------------------------------------------
// Reports and snapshots
// ---------------------------------------------------------------------------

/// Terminal summary of one execution, emitted on the completion channel.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub execution_id: String,
    pub workflow_id: String,
    /// `Completed`, `Failed`, or `Cancelled`.
    pub status: ExecutionStatus,
    pub error_msg: Option<String>,
    pub error_code: Option<String>,
    pub node_records: Vec<ExecutionNodeRecord>,
    pub metrics: ExecutionMetrics,
    /// Final state of the variables bus.
    pub output: ValueMap,
    pub finished_at: DateTime<Utc>,
}

/// Point-in-time view of a live execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSnapshot {
    pub execution_id: String,
    pub workflow_id: String,
    pub node_states: HashMap<String, NodeRunStatus>,
    pub variables: ValueMap,
}

// ---------------------------------------------------------------------------
// Internal per-execution state
// ---------------------------------------------------------------------------

struct RunState {
    node_states: HashMap<String, NodeRunStatus>,
    /// node-id → upstream node-ids, derived from enabled edges.
    dependencies: HashMap<String, Vec<String>>,
    completed: HashSet<String>,
    executing: HashSet<String>,
    /// completed + failed + skipped + cancelled. The run is over when every
    /// node is settled.
    settled: HashSet<String>,
    /// Global write-through bus, namespaced by node id.
    variables: ValueMap,
    records: HashMap<String, ExecutionNodeRecord>,
    /// First error wins; set once, aborts the run.
    failure: Option<(String, String)>,
    /// Dropped (closing the ready channel) on termination or failure.
    ready_tx: Option<mpsc::Sender<String>>,
}

struct RunContext {
    execution_id: String,
    workflow: Arc<Workflow>,
    registry: Arc<NodeRegistry>,
    state: Mutex<RunState>,
    cancel: CancellationToken,
    default_node_timeout: Duration,
    node_count: usize,
}

struct ExecutionHandle {
    workflow_id: String,
    cancel: CancellationToken,
    cancel_requested: Arc<AtomicBool>,
    run: Arc<RunContext>,
    supervisor: Option<JoinHandle<()>>,
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

struct EngineInner {
    status: Mutex<EngineStatus>,
    executions: Mutex<HashMap<String, ExecutionHandle>>,
    registry: Arc<NodeRegistry>,
    config: EngineConfig,
    report_tx: mpsc::UnboundedSender<ExecutionReport>,
    root_token: Mutex<CancellationToken>,
}

/// The concurrent DAG execution engine.
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

impl WorkflowEngine {
    /// Build an engine and hand back the completion-report receiver the
    /// execution service consumes.
    pub fn new(
        registry: Arc<NodeRegistry>,
        config: EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ExecutionReport>) {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let engine = Self {
            inner: Arc::new(EngineInner {
                status: Mutex::new(EngineStatus::Stopped),
                executions: Mutex::new(HashMap::new()),
                registry,
                config,
                report_tx,
                root_token: Mutex::new(CancellationToken::new()),
            }),
        };
        (engine, report_rx)
    }

    pub fn status(&self) -> EngineStatus {
        *self.inner.status.lock().unwrap()
    }

    /// Transition stopped → running.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut status = self.inner.status.lock().unwrap();
        if *status == EngineStatus::Running {
            return Err(EngineError::EngineAlreadyRunning);
        }
        *status = EngineStatus::Running;
        *self.inner.root_token.lock().unwrap() = CancellationToken::new();
        info!("workflow engine started");
        Ok(())
    }

    /// Transition running → stopping → stopped: cancel every in-flight
    /// execution and wait for its workers to drain.
    pub async fn stop(&self) -> Result<(), EngineError> {
        {
            let mut status = self.inner.status.lock().unwrap();
            if *status != EngineStatus::Running {
                return Err(EngineError::EngineNotRunning);
            }
            *status = EngineStatus::Stopping;
        }

        self.inner.root_token.lock().unwrap().cancel();

        let handles: Vec<ExecutionHandle> = {
            let mut executions = self.inner.executions.lock().unwrap();
            executions.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &handles {
            handle.cancel_requested.store(true, Ordering::SeqCst);
            handle.cancel.cancel();
        }
        for handle in handles {
            if let Some(task) = handle.supervisor {
                let _ = task.await;
            }
        }

        *self.inner.status.lock().unwrap() = EngineStatus::Stopped;
        info!("workflow engine stopped");
        Ok(())
    }

    /// Admit a new execution. Non-blocking: the run happens on spawned
    /// tasks and the terminal outcome arrives as an [`ExecutionReport`].
    ///
    /// # Errors
    /// - [`EngineError::EngineNotRunning`] before `start`.
    /// - [`EngineError::CapacityExceeded`] at the admission cap.
    /// - [`EngineError::EmptyWorkflow`] / [`EngineError::NoStartNode`] for
    ///   graphs that cannot run.
    #[instrument(skip(self, workflow, execution), fields(execution_id = %execution.id, workflow_id = %workflow.id))]
    pub fn execute_workflow(
        &self,
        workflow: Workflow,
        execution: &Execution,
    ) -> Result<(), EngineError> {
        if self.status() != EngineStatus::Running {
            return Err(EngineError::EngineNotRunning);
        }
        if workflow.nodes.is_empty() {
            return Err(EngineError::EmptyWorkflow);
        }

        // -------------------------------------------------------------------
        // Build the dependency graph from enabled edges.
        // -------------------------------------------------------------------
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        let mut node_states: HashMap<String, NodeRunStatus> = HashMap::new();
        for id in workflow.nodes.keys() {
            dependencies.insert(id.clone(), Vec::new());
            node_states.insert(id.clone(), NodeRunStatus::Pending);
        }
        for edge in workflow.edges.iter().filter(|e| e.is_enabled()) {
            if !workflow.nodes.contains_key(&edge.from_node_id)
                || !workflow.nodes.contains_key(&edge.to_node_id)
            {
                warn!(
                    edge_id = %edge.id,
                    "edge references a non-existent node, ignoring"
                );
                continue;
            }
            dependencies
                .get_mut(&edge.to_node_id)
                .unwrap()
                .push(edge.from_node_id.clone());
        }

        let start_nodes: Vec<String> = dependencies
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        if start_nodes.is_empty() {
            return Err(EngineError::NoStartNode);
        }

        // -------------------------------------------------------------------
        // Seed the ready channel and the variables bus.
        // -------------------------------------------------------------------
        let node_count = workflow.nodes.len();
        let (ready_tx, ready_rx) = mpsc::channel(node_count);
        for id in &start_nodes {
            // Capacity equals node count, so these sends cannot fail.
            let _ = ready_tx.try_send(id.clone());
        }

        let mut variables = execution.context.variables.clone();
        if !execution.context.input.is_empty() {
            variables.insert(
                "input".to_string(),
                serde_json::to_value(&execution.context.input).unwrap_or(Value::Null),
            );
        }

        let cancel = self.inner.root_token.lock().unwrap().child_token();
        let run = Arc::new(RunContext {
            execution_id: execution.id.clone(),
            workflow: Arc::new(workflow),
            registry: Arc::clone(&self.inner.registry),
            state: Mutex::new(RunState {
                node_states,
                dependencies,
                completed: HashSet::new(),
                executing: HashSet::new(),
                settled: HashSet::new(),
                variables,
                records: HashMap::new(),
                failure: None,
                ready_tx: Some(ready_tx),
            }),
            cancel: cancel.clone(),
            default_node_timeout: self.inner.config.default_node_timeout,
            node_count,
        });
        let cancel_requested = Arc::new(AtomicBool::new(false));

        // -------------------------------------------------------------------
        // Admit under the concurrency cap, then launch the supervisor.
        // -------------------------------------------------------------------
        {
            let mut executions = self.inner.executions.lock().unwrap();
            if executions.len() >= self.inner.config.max_concurrent_executions {
                return Err(EngineError::CapacityExceeded(
                    self.inner.config.max_concurrent_executions,
                ));
            }
            if executions.contains_key(&execution.id) {
                return Err(EngineError::Validation(format!(
                    "execution '{}' is already running",
                    execution.id
                )));
            }
            executions.insert(
                execution.id.clone(),
                ExecutionHandle {
                    workflow_id: run.workflow.id.clone(),
                    cancel,
                    cancel_requested: Arc::clone(&cancel_requested),
                    run: Arc::clone(&run),
                    supervisor: None,
                },
            );
        }

        let supervisor = tokio::spawn(run_execution(
            Arc::clone(&self.inner),
            Arc::clone(&run),
            ready_rx,
            cancel_requested,
            self.inner.config.workers_per_execution,
        ));

        // Attach the supervisor handle; the entry may already be gone if a
        // tiny run finished first, which is fine.
        if let Some(handle) = self
            .inner
            .executions
            .lock()
            .unwrap()
            .get_mut(&execution.id)
        {
            handle.supervisor = Some(supervisor);
        }

        info!(start_nodes = ?start_nodes, "execution admitted");
        Ok(())
    }

    /// Cooperatively cancel a live execution. Idempotent while admitted;
    /// unknown ids return [`EngineError::ExecutionNotFound`].
    pub fn cancel_execution(&self, execution_id: &str) -> Result<(), EngineError> {
        let executions = self.inner.executions.lock().unwrap();
        let handle = executions
            .get(execution_id)
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;
        handle.cancel_requested.store(true, Ordering::SeqCst);
        handle.cancel.cancel();
        info!(execution_id, "execution cancellation requested");
        Ok(())
    }

    /// Snapshot a live execution's node states and variables.
    pub fn execution_status(&self, execution_id: &str) -> Result<ExecutionSnapshot, EngineError> {
        let executions = self.inner.executions.lock().unwrap();
        let handle = executions
            .get(execution_id)
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;
        let state = handle.run.state.lock().unwrap();
        Ok(ExecutionSnapshot {
            execution_id: execution_id.to_string(),
            workflow_id: handle.workflow_id.clone(),
            node_states: state.node_states.clone(),
            variables: state.variables.clone(),
        })
    }

    /// Ids of all admitted executions.
    pub fn active_executions(&self) -> Vec<String> {
        self.inner.executions.lock().unwrap().keys().cloned().collect()
    }

    /// Whether another execution can currently be admitted.
    pub fn has_capacity(&self) -> bool {
        self.inner.executions.lock().unwrap().len() < self.inner.config.max_concurrent_executions
    }

    /// The configured admission cap.
    pub fn capacity(&self) -> usize {
        self.inner.config.max_concurrent_executions
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

async fn run_execution(
    inner: Arc<EngineInner>,
    run: Arc<RunContext>,
    ready_rx: mpsc::Receiver<String>,
    cancel_requested: Arc<AtomicBool>,
    worker_count: usize,
) {
    let started = Instant::now();
    let ready_rx = Arc::new(tokio::sync::Mutex::new(ready_rx));

    let mut workers = JoinSet::new();
    for _ in 0..worker_count.max(1) {
        workers.spawn(worker_loop(Arc::clone(&run), Arc::clone(&ready_rx)));
    }
    while workers.join_next().await.is_some() {}

    let report = {
        let mut state = run.state.lock().unwrap();
        state.ready_tx.take();

        let mut node_records: Vec<ExecutionNodeRecord> =
            state.records.values().cloned().collect();
        node_records.sort_by(|a, b| (a.start_time, &a.node_id).cmp(&(b.start_time, &b.node_id)));

        let count = |status: NodeRunStatus| {
            node_records.iter().filter(|r| r.status == status).count() as u32
        };
        let metrics = ExecutionMetrics {
            total_nodes: node_records.len() as u32,
            completed_nodes: count(NodeRunStatus::Completed),
            failed_nodes: count(NodeRunStatus::Failed),
            skipped_nodes: count(NodeRunStatus::Skipped),
            execution_time_ms: started.elapsed().as_millis() as u64,
            queue_time_ms: 0,
            wait_time_ms: 0,
        };

        let all_settled = state.settled.len() == run.node_count;
        let (status, error_msg, error_code) = if cancel_requested.load(Ordering::SeqCst) {
            (ExecutionStatus::Cancelled, None, None)
        } else if let Some((message, code)) = state.failure.clone() {
            (ExecutionStatus::Failed, Some(message), Some(code))
        } else if all_settled {
            (ExecutionStatus::Completed, None, None)
        } else {
            // Workers drained without finishing and without an error: the
            // engine's root context died underneath the run.
            (ExecutionStatus::Cancelled, None, None)
        };

        ExecutionReport {
            execution_id: run.execution_id.clone(),
            workflow_id: run.workflow.id.clone(),
            status,
            error_msg,
            error_code,
            node_records,
            metrics,
            output: state.variables.clone(),
            finished_at: Utc::now(),
        }
    };

    inner.executions.lock().unwrap().remove(&run.execution_id);

    match report.status {
        ExecutionStatus::Completed => info!(execution_id = %run.execution_id, "execution completed"),
        ExecutionStatus::Cancelled => info!(execution_id = %run.execution_id, "execution cancelled"),
        _ => error!(
            execution_id = %run.execution_id,
            error = report.error_msg.as_deref().unwrap_or(""),
            "execution failed"
        ),
    }
    let _ = inner.report_tx.send(report);
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

async fn worker_loop(
    run: Arc<RunContext>,
    ready_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
) {
    loop {
        let node_id = {
            let mut rx = ready_rx.lock().await;
            tokio::select! {
                _ = run.cancel.cancelled() => return,
                next = rx.recv() => match next {
                    Some(id) => id,
                    // Channel closed and drained: the run is over.
                    None => return,
                },
            }
        };

        // Claim the node; another worker may have beaten us to it.
        let input = {
            let mut state = run.state.lock().unwrap();
            if state.executing.contains(&node_id) || state.settled.contains(&node_id) {
                continue;
            }
            let node = match run.workflow.nodes.get(&node_id) {
                Some(node) => node,
                None => continue,
            };
            state.executing.insert(node_id.clone());
            state
                .node_states
                .insert(node_id.clone(), NodeRunStatus::Running);

            let input = prepare_input(&state.variables, node, &run);
            let mut record =
                ExecutionNodeRecord::new(&node_id, &node.name, NodeRunStatus::Running);
            record.start_time = Some(Utc::now());
            record.input = input.data.clone();
            state.records.insert(node_id.clone(), record);
            input
        };

        let node = &run.workflow.nodes[&node_id];
        debug!(node_id = %node_id, plugin = %node.plugin, "executing node");

        let plugin = match run.registry.get(&node.plugin) {
            Ok(plugin) => plugin,
            Err(e) => {
                fail_node(
                    &run,
                    &node_id,
                    format!("failed to get node plugin '{}': {e}", node.plugin),
                    "plugin_not_found",
                    Vec::new(),
                );
                return;
            }
        };

        let timeout = resolve_node_timeout(node, &run);
        let node_started = Instant::now();
        let outcome = tokio::select! {
            _ = run.cancel.cancelled() => {
                cancel_node(&run, &node_id, node_started);
                return;
            }
            outcome = tokio::time::timeout(timeout, plugin.execute(input)) => outcome,
        };

        match outcome {
            Err(_elapsed) => {
                fail_node(
                    &run,
                    &node_id,
                    format!("node timed out after {timeout:?}"),
                    "timeout",
                    Vec::new(),
                );
                return;
            }
            Ok(Err(e)) => {
                fail_node(&run, &node_id, e.to_string(), "plugin_error", Vec::new());
                return;
            }
            Ok(Ok(output)) if !output.success => {
                let message = output
                    .error
                    .clone()
                    .unwrap_or_else(|| "node execution failed".to_string());
                fail_node(&run, &node_id, message, "plugin_error", output.logs);
                return;
            }
            Ok(Ok(output)) => {
                complete_node(&run, &node_id, output, node_started);
            }
        }
    }
}

/// Derive a node's deadline: min of the node timeout, the workflow's task
/// timeout, and the engine default.
fn resolve_node_timeout(node: &Node, run: &RunContext) -> Duration {
    let candidates = [
        node.execution_timeout(),
        run.workflow
            .config
            .as_ref()
            .and_then(|c| c.task_timeout())
            .filter(|d| !d.is_zero()),
        Some(run.default_node_timeout),
    ];
    candidates
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(run.default_node_timeout)
}

/// Copy the variables bus, apply the node's input mapping, then its defaults.
fn prepare_input(variables: &ValueMap, node: &Node, run: &RunContext) -> NodeInput {
    let mut data = variables.clone();
    if let Some(input_config) = node.config.as_ref().and_then(|c| c.input.as_ref()) {
        for (target, source) in &input_config.mapping {
            if let Some(value) = variables.get(source) {
                data.insert(target.clone(), value.clone());
            }
        }
        for (key, default) in &input_config.defaults {
            data.entry(key.clone()).or_insert_with(|| default.clone());
        }
    }

    let context = ValueMap::from([
        ("execution_id".to_string(), Value::String(run.execution_id.clone())),
        ("workflow_id".to_string(), Value::String(run.workflow.id.clone())),
    ]);

    NodeInput {
        data,
        config: node.plugin_config(),
        context,
        variables: variables.clone(),
    }
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

fn complete_node(run: &RunContext, node_id: &str, output: NodeOutput, started: Instant) {
    let mut state = run.state.lock().unwrap();

    // Merge the output into the bus under namespaced keys.
    for (key, value) in &output.data {
        state
            .variables
            .insert(format!("{node_id}_{key}"), value.clone());
    }
    state.variables.insert(
        format!("{node_id}_output"),
        serde_json::to_value(&output.data).unwrap_or(Value::Null),
    );

    if let Some(record) = state.records.get_mut(node_id) {
        record.status = NodeRunStatus::Completed;
        record.end_time = Some(Utc::now());
        record.duration_ms = started.elapsed().as_millis() as u64;
        record.output = output.data;
        record.logs = output.logs;
    }
    state
        .node_states
        .insert(node_id.to_string(), NodeRunStatus::Completed);
    state.executing.remove(node_id);
    state.completed.insert(node_id.to_string());
    state.settled.insert(node_id.to_string());
    debug!(node_id, "node completed");

    activate_downstream(&mut state, run, node_id);
    close_if_settled(&mut state, run);
}

fn fail_node(run: &RunContext, node_id: &str, message: String, code: &str, logs: Vec<String>) {
    error!(node_id, %message, "node failed");
    let mut state = run.state.lock().unwrap();

    match state.records.get_mut(node_id) {
        Some(record) => {
            record.status = NodeRunStatus::Failed;
            record.end_time = Some(Utc::now());
            if let Some(start) = record.start_time {
                record.duration_ms = (Utc::now() - start).num_milliseconds().max(0) as u64;
            }
            record.error_msg = Some(message.clone());
            record.logs = logs;
        }
        None => {
            let name = run
                .workflow
                .nodes
                .get(node_id)
                .map(|n| n.name.clone())
                .unwrap_or_default();
            let mut record = ExecutionNodeRecord::new(node_id, name, NodeRunStatus::Failed);
            record.error_msg = Some(message.clone());
            record.logs = logs;
            state.records.insert(node_id.to_string(), record);
        }
    }
    state
        .node_states
        .insert(node_id.to_string(), NodeRunStatus::Failed);
    state.executing.remove(node_id);
    state.settled.insert(node_id.to_string());

    if state.failure.is_none() {
        state.failure = Some((format!("node '{node_id}' failed: {message}"), code.to_string()));
    }
    // Fail fast: close the queue and abort in-flight siblings.
    state.ready_tx.take();
    drop(state);
    run.cancel.cancel();
}

fn cancel_node(run: &RunContext, node_id: &str, started: Instant) {
    let mut state = run.state.lock().unwrap();
    if let Some(record) = state.records.get_mut(node_id) {
        record.status = NodeRunStatus::Cancelled;
        record.end_time = Some(Utc::now());
        record.duration_ms = started.elapsed().as_millis() as u64;
        record.error_msg = Some("execution cancelled".to_string());
    }
    state
        .node_states
        .insert(node_id.to_string(), NodeRunStatus::Cancelled);
    state.executing.remove(node_id);
    state.settled.insert(node_id.to_string());
}

/// For each enabled edge leaving the completed node, evaluate its condition
/// (skipping the target on false or evaluation error) and enqueue or skip
/// the target depending on its dependencies.
fn activate_downstream(state: &mut RunState, run: &RunContext, completed_id: &str) {
    for edge in run
        .workflow
        .edges
        .iter()
        .filter(|e| e.is_enabled() && e.from_node_id == completed_id)
    {
        let target = &edge.to_node_id;
        if !state.dependencies.contains_key(target) {
            continue;
        }

        if edge.is_conditional() {
            let taken = match edge.condition() {
                Some(cond) if !cond.enabled => cond.default_value,
                Some(cond) => match condition::evaluate(&cond.expression, &state.variables) {
                    Ok(taken) => taken,
                    Err(e) => {
                        warn!(edge_id = %edge.id, error = %e, "condition evaluation failed, skipping target");
                        false
                    }
                },
                None => false,
            };
            if !taken {
                debug!(edge_id = %edge.id, target = %target, "edge condition not met, skipping target");
                skip_node(state, run, target);
                continue;
            }
        }

        resolve_target(state, run, target);
    }
}

/// Enqueue the target when every dependency completed; skip it when every
/// dependency settled but not all of them completed (its join can never be
/// satisfied).
fn resolve_target(state: &mut RunState, run: &RunContext, target: &str) {
    let deps = match state.dependencies.get(target) {
        Some(deps) => deps.clone(),
        None => return,
    };
    if !deps.iter().all(|dep| state.settled.contains(dep)) {
        return;
    }
    if deps.iter().all(|dep| state.completed.contains(dep)) {
        if state.settled.contains(target) || state.executing.contains(target) {
            return;
        }
        if let Some(tx) = &state.ready_tx {
            // Full channel: drop silently, capacity ≥ node count makes this
            // unreachable in practice.
            let _ = tx.try_send(target.to_string());
            debug!(target, "node ready for execution");
        }
    } else {
        skip_node(state, run, target);
    }
}

/// Mark a node skipped and propagate to any downstream join that can no
/// longer be satisfied.
fn skip_node(state: &mut RunState, run: &RunContext, node_id: &str) {
    if state.settled.contains(node_id) || state.executing.contains(node_id) {
        return;
    }
    state
        .node_states
        .insert(node_id.to_string(), NodeRunStatus::Skipped);
    state.settled.insert(node_id.to_string());
    let name = run
        .workflow
        .nodes
        .get(node_id)
        .map(|n| n.name.clone())
        .unwrap_or_default();
    state
        .records
        .entry(node_id.to_string())
        .or_insert_with(|| ExecutionNodeRecord::new(node_id, name, NodeRunStatus::Skipped));

    let downstream: Vec<String> = run
        .workflow
        .edges
        .iter()
        .filter(|e| e.is_enabled() && e.from_node_id == node_id)
        .map(|e| e.to_node_id.clone())
        .collect();
    for target in downstream {
        resolve_target(state, run, &target);
    }
    close_if_settled(state, run);
}

/// Close the ready channel once every node settled so workers drain and the
/// supervisor can report.
fn close_if_settled(state: &mut RunState, run: &RunContext) {
    if state.settled.len() == run.node_count {
        state.ready_tx.take();
    }
}
