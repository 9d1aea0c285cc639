//! Pipeline orchestrator: builds units and row sets from a graph, runs one
//! thread per unit, and aggregates the outcome.
//!
//! `build` does all validation, wiring, and transform initialization; any
//! failure there returns before a single thread exists. `start` is
//! non-blocking; `wait_until_finished` joins every unit and reports in
//! unit-start order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

use rowflow_core::hash::hash_serde;
use rowflow_core::prelude::{
    EngineConfig, PipelineGraph, RowSetId, RowSetName, RunManifest, UnitKey,
};
use rowflow_steps::{Registry, StepContext, Transform};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::control::RunControl;
use crate::error::ExecError;
use crate::listener::RowListener;
use crate::merge::MergePolicy;
use crate::producer::RowProducer;
use crate::result::{FatalError, PipelineResult};
use crate::rowset::RowSet;
use crate::unit::{panic_message, ErrorRoute, ExitGuard, StepExecutionUnit, UnitState, UnitStatus};
use crate::wiring;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Live view of one unit while the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSnapshot {
    pub unit: UnitKey,
    pub state: UnitState,
    pub read: u64,
    pub written: u64,
    pub rejected: u64,
    pub errors: u64,
    /// Records buffered in the unit's input row sets.
    pub input_buffered: usize,
    /// Records buffered in the unit's output row sets.
    pub output_buffered: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Prepared,
    Running,
    Finished,
}

/// Row sets a unit touches, kept for status snapshots.
struct UnitIo {
    inputs: Vec<Arc<RowSet>>,
    outputs: Vec<Arc<RowSet>>,
}

pub struct Pipeline {
    name: String,
    config: EngineConfig,
    control: Arc<RunControl>,
    statuses: Vec<Arc<UnitStatus>>,
    io: Vec<UnitIo>,
    pending: Vec<StepExecutionUnit>,
    handles: Vec<(UnitKey, JoinHandle<UnitState>)>,
    manifest: RunManifest,
    next_rowset_id: u64,
    phase: Phase,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("units", &self.statuses.len())
            .field("phase", &self.phase)
            .finish()
    }
}

/// Dispose every transform built so far; used when `build` bails out.
fn dispose_all(built: &mut [Box<dyn Transform>]) {
    for t in built.iter_mut() {
        t.dispose();
    }
}

impl Pipeline {
    /// Validate, wire, and initialize. Nothing runs yet.
    pub fn build(
        graph: &PipelineGraph,
        registry: &Registry,
        config: EngineConfig,
    ) -> Result<Self, ExecError> {
        config.validate()?;
        graph.validate()?;
        for s in &graph.steps {
            if !registry.contains(&s.kind) {
                return Err(ExecError::Registry(format!(
                    "step '{}' has unknown type '{}'",
                    s.name, s.kind
                )));
            }
        }

        let graph_hash = hash_serde(graph).map_err(|e| ExecError::Hash(e.to_string()))?;
        let wiring = wiring::wire(graph, config.rowset_capacity)?;
        let next_rowset_id = wiring.rowsets.len() as u64;
        let control = Arc::new(RunControl::new(config.error_policy));

        // Create and init every transform before any unit exists.
        let mut transforms: Vec<Box<dyn Transform>> = Vec::with_capacity(wiring.units.len());
        for uw in &wiring.units {
            let def = graph
                .find(&uw.key.step)
                .ok_or_else(|| ExecError::Configuration(format!("unknown step '{}'", uw.key.step)))?;
            let ctx = StepContext::new(uw.key.clone(), def.copies, def.config.clone());
            let made = registry.make(&def.kind, &ctx).and_then(|mut t| {
                t.init(&ctx)?;
                Ok(t)
            });
            match made {
                Ok(t) => transforms.push(t),
                Err(e) => {
                    dispose_all(&mut transforms);
                    return Err(ExecError::Init {
                        unit: uw.key.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let mut statuses = Vec::with_capacity(wiring.units.len());
        let mut io = Vec::with_capacity(wiring.units.len());
        let mut pending = Vec::with_capacity(wiring.units.len());
        for (uw, transform) in wiring.units.into_iter().zip(transforms) {
            let def = graph
                .find(&uw.key.step)
                .ok_or_else(|| ExecError::Configuration(format!("unknown step '{}'", uw.key.step)))?;
            let merge = MergePolicy::from_spec(def.merge.as_ref(), uw.inputs.len(), &config);
            let route = def
                .error_handling
                .as_ref()
                .map(|eh| ErrorRoute::new(uw.error_outputs.clone(), eh.clone()));

            io.push(UnitIo {
                inputs: uw.inputs.clone(),
                outputs: uw.outputs.iter().chain(&uw.error_outputs).cloned().collect(),
            });
            let unit = StepExecutionUnit::new(uw.key, transform, Arc::clone(&control), &config)
                .with_inputs(uw.inputs)
                .with_outputs(uw.outputs, def.output)
                .with_error_route(route)
                .with_merge(merge);
            statuses.push(unit.status());
            pending.push(unit);
        }

        info!(
            pipeline = %graph.name,
            units = pending.len(),
            rowsets = next_rowset_id,
            "pipeline built"
        );

        Ok(Self {
            name: graph.name.clone(),
            manifest: RunManifest::new(graph_hash, now_ms()),
            config,
            control,
            statuses,
            io,
            pending,
            handles: Vec::new(),
            next_rowset_id,
            phase: Phase::Prepared,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn control(&self) -> &Arc<RunControl> {
        &self.control
    }

    fn require(&self, phase: Phase, action: &str) -> Result<(), ExecError> {
        if self.phase != phase {
            return Err(ExecError::State(format!(
                "cannot {action}: pipeline is {:?}",
                self.phase
            )));
        }
        Ok(())
    }

    fn unit_index(&self, step: &str, copy: usize) -> Result<usize, ExecError> {
        self.pending
            .iter()
            .position(|u| u.key().step == step && u.key().copy == copy)
            .ok_or_else(|| ExecError::Configuration(format!("no unit {step}.{copy}")))
    }

    /// Inject rows from outside into `step.copy`. Only before `start`.
    ///
    /// The new input ranks after every wired input. A single-input unit
    /// switches to a round-robin merge.
    pub fn add_row_producer(&mut self, step: &str, copy: usize) -> Result<RowProducer, ExecError> {
        self.require(Phase::Prepared, "add a row producer")?;
        let idx = self.unit_index(step, copy)?;
        let id = self.next_rowset_id;
        self.next_rowset_id += 1;

        let unit = &mut self.pending[idx];
        let name = RowSetName::new(
            UnitKey::new(format!("producer-{id}"), 0),
            unit.key().clone(),
        );
        let rs = Arc::new(RowSet::new(
            RowSetId::new(id),
            name,
            self.config.rowset_capacity,
        ));
        unit.add_input(Arc::clone(&rs));
        if matches!(unit.merge_policy(), MergePolicy::Single { .. }) && unit.inputs().len() > 1 {
            unit.set_merge_policy(MergePolicy::RoundRobin {
                block_rows: self.config.round_robin_block_rows,
                wait: self.config.get_timeout(),
            });
        }
        self.io[idx].inputs.push(Arc::clone(&rs));
        debug!(unit = %unit.key(), "row producer attached");

        Ok(RowProducer::new(
            rs,
            Arc::clone(&self.control),
            self.config.put_timeout(),
        ))
    }

    /// Observe every row of `step.copy`. Only before `start`.
    pub fn add_row_listener(
        &mut self,
        step: &str,
        copy: usize,
        listener: Arc<dyn RowListener>,
    ) -> Result<(), ExecError> {
        self.require(Phase::Prepared, "add a row listener")?;
        let idx = self.unit_index(step, copy)?;
        self.pending[idx].add_listener(listener);
        Ok(())
    }

    /// Spawn one named thread per unit, in start order. Non-blocking.
    pub fn start(&mut self) -> Result<(), ExecError> {
        self.require(Phase::Prepared, "start")?;
        self.phase = Phase::Running;
        self.manifest = RunManifest::new(self.manifest.graph_hash, now_ms());

        for unit in std::mem::take(&mut self.pending) {
            let key = unit.key().clone();
            let guard: ExitGuard = unit.exit_guard();
            let spawned = thread::Builder::new()
                .name(key.to_string())
                .spawn(move || match panic::catch_unwind(AssertUnwindSafe(move || unit.run())) {
                    Ok(state) => state,
                    Err(payload) => guard.panicked(panic_message(payload.as_ref())),
                });
            match spawned {
                Ok(handle) => self.handles.push((key, handle)),
                Err(e) => {
                    // Dropping the unspawned units finishes their row sets
                    // and disposes their transforms.
                    error!(unit = %key, error = %e, "failed to spawn unit thread");
                    self.control.cancel();
                    return Err(ExecError::Spawn(e));
                }
            }
        }
        info!(pipeline = %self.name, units = self.handles.len(), "pipeline started");
        Ok(())
    }

    /// Block until every unit is terminal, then aggregate.
    pub fn wait_until_finished(&mut self) -> Result<PipelineResult, ExecError> {
        self.require(Phase::Running, "wait for completion")?;
        for (key, handle) in std::mem::take(&mut self.handles) {
            if handle.join().is_err() {
                error!(unit = %key, "unit thread ended abnormally");
            }
        }
        self.phase = Phase::Finished;

        let units: Vec<_> = self.statuses.iter().map(|s| s.report()).collect();
        let first_error = units.iter().find(|u| u.state == UnitState::Error).map(|u| FatalError {
            unit: u.unit.clone(),
            message: u.fatal.clone().unwrap_or_else(|| "unit failed".into()),
        });
        let manifest = self.manifest.clone().finish(now_ms());
        let result = PipelineResult {
            units,
            first_error,
            stopped: self.control.is_cancelled(),
            manifest,
        };

        let totals = result.totals();
        info!(
            pipeline = %self.name,
            read = totals.read,
            written = totals.written,
            rejected = totals.rejected,
            errors = totals.errors,
            duration_ms = result.manifest.duration_ms(),
            "pipeline finished"
        );
        Ok(result)
    }

    /// Cooperative stop: every unit ends at its next check.
    pub fn stop(&self) {
        info!(pipeline = %self.name, "stop requested");
        self.control.cancel();
        self.control.resume();
    }

    /// Sources stop producing; rows already in flight drain normally.
    pub fn safe_stop(&self) {
        info!(pipeline = %self.name, "safe stop requested");
        self.control.request_safe_stop();
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn is_finished(&self) -> bool {
        self.statuses.iter().all(|s| s.state().is_terminal())
    }

    pub fn status(&self) -> Vec<UnitSnapshot> {
        self.statuses
            .iter()
            .zip(&self.io)
            .map(|(s, io)| UnitSnapshot {
                unit: s.key().clone(),
                state: s.state(),
                read: s.read(),
                written: s.written(),
                rejected: s.rejected(),
                errors: s.errors(),
                input_buffered: io.inputs.iter().map(|rs| rs.size()).sum(),
                output_buffered: io.outputs.iter().map(|rs| rs.size()).sum(),
            })
            .collect()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // Units that never started are disposed on drop.
        self.pending.clear();
        if self.handles.is_empty() {
            return;
        }
        self.control.cancel();
        self.control.resume();
        for (_, handle) in std::mem::take(&mut self.handles) {
            let _ = handle.join();
        }
    }
}
