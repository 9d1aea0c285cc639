//! Step registry: maps a step `type` string to a transform factory.
//!
//! The exec runtime looks kinds up here when it builds a pipeline, one
//! `make` call per step copy.

use std::collections::HashMap;

use rowflow_core::prelude::Record;

use crate::builtin;
use crate::traits::{Emit, StepContext, StepError, Transform};

type Factory = Box<dyn Fn(&StepContext) -> Result<Box<dyn Transform>, StepError> + Send + Sync>;

pub struct Registry {
    factories: HashMap<String, Factory>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl Registry {
    /// Registry with every built-in step pre-registered.
    pub fn new() -> Self {
        let mut reg = Self::empty();
        builtin::register_all(&mut reg);
        reg
    }

    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register (or replace) a factory for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&StepContext) -> Result<Box<dyn Transform>, StepError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    /// Register a stateless per-row closure. As a source it produces nothing.
    pub fn register_fn<F>(&mut self, kind: impl Into<String>, f: F)
    where
        F: Fn(Record) -> Result<Emit, StepError> + Clone + Send + Sync + 'static,
    {
        let kind = kind.into();
        let name = kind.clone();
        self.register(kind, move |_ctx| {
            Ok(Box::new(FnTransform {
                kind: name.clone(),
                f: f.clone(),
            }))
        });
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Instantiate a transform for one step copy. `init` is left to the caller.
    pub fn make(&self, kind: &str, ctx: &StepContext) -> Result<Box<dyn Transform>, StepError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| StepError::Fatal(format!("unknown step type '{kind}'")))?;
        factory(ctx)
    }
}

struct FnTransform<F> {
    kind: String,
    f: F,
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(Record) -> Result<Emit, StepError> + Send,
{
    fn name(&self) -> &str {
        &self.kind
    }

    fn process(&mut self, input: Option<Record>) -> Result<Emit, StepError> {
        match input {
            Some(record) => (self.f)(record),
            None => Ok(Emit::Exhausted),
        }
    }
}
