//! Engine: an `EngineConfig` plus a step registry, for callers that just want
//! to run a graph.

use rowflow_core::prelude::{EngineConfig, PipelineGraph};
use rowflow_steps::Registry;

use crate::error::ExecError;
use crate::pipeline::Pipeline;
use crate::result::PipelineResult;

#[derive(Debug)]
pub struct Engine {
    cfg: EngineConfig,
    registry: Registry,
}

impl Engine {
    /// Engine with the built-in steps registered.
    pub fn new(cfg: EngineConfig) -> Self {
        Self::with_registry(cfg, Registry::new())
    }

    pub fn with_registry(cfg: EngineConfig, registry: Registry) -> Self {
        Self { cfg, registry }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register custom steps before preparing pipelines.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Build (validate, wire, init) without starting.
    pub fn prepare(&self, graph: &PipelineGraph) -> Result<Pipeline, ExecError> {
        Pipeline::build(graph, &self.registry, self.cfg.clone())
    }

    /// Build, start, and wait for the pipeline to finish.
    pub fn run(&self, graph: &PipelineGraph) -> Result<PipelineResult, ExecError> {
        let mut pipeline = self.prepare(graph)?;
        pipeline.start()?;
        pipeline.wait_until_finished()
    }
}
