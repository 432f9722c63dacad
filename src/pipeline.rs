//! Priority-ordered stage pipelines.
//!
//! Both the content pipeline and the post-processing pipeline are an ordered
//! list of named stages applied to a mutable per-file context. Stages run in
//! **descending priority**; stages with equal priority run in the order they
//! were registered, so the standard stages (registered first) precede custom
//! stages at the same priority.
//!
//! Stages arrive from two places: code (always well-formed) and config
//! (`[[processing.plugins]]`), where a stage may be unknown or lack a
//! priority. [`StageSpec`] carries the loosely-typed form; the pipeline drops
//! malformed specs with a warning at registration time instead of failing
//! at run time.
//!
//! The pipeline is generic over the stage trait object (`dyn ContentStage`,
//! `dyn PostStage`); applying a stage is left to the caller through
//! [`Pipeline::run`].

use std::cmp::Reverse;
use thiserror::Error;
use tracing::{debug, warn};

/// Error type stage implementations return. Any error converts with `?`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of applying one stage.
pub type StageResult = Result<(), BoxError>;

#[derive(Error, Debug)]
#[error("stage `{stage}` failed: {source}")]
pub struct StageError {
    pub stage: String,
    #[source]
    pub source: BoxError,
}

/// A stage as declared, before validation.
pub struct StageSpec<S: ?Sized> {
    pub name: String,
    pub priority: Option<i32>,
    pub stage: Option<Box<S>>,
}

impl<S: ?Sized> StageSpec<S> {
    pub fn new(name: impl Into<String>, priority: i32, stage: Box<S>) -> Self {
        Self {
            name: name.into(),
            priority: Some(priority),
            stage: Some(stage),
        }
    }
}

struct Registered<S: ?Sized> {
    name: String,
    priority: i32,
    stage: Box<S>,
}

/// An ordered list of stages.
pub struct Pipeline<S: ?Sized> {
    stages: Vec<Registered<S>>,
}

impl<S: ?Sized> Default for Pipeline<S> {
    fn default() -> Self {
        Self { stages: Vec::new() }
    }
}

impl<S: ?Sized> Pipeline<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a well-formed stage.
    pub fn register(&mut self, name: impl Into<String>, priority: i32, stage: Box<S>) {
        self.stages.push(Registered {
            name: name.into(),
            priority,
            stage,
        });
        // stable: ties keep registration order
        self.stages.sort_by_key(|s| Reverse(s.priority));
    }

    /// Validate and add a declared stage. Returns whether it was kept.
    pub fn register_spec(&mut self, spec: StageSpec<S>) -> bool {
        match (spec.priority, spec.stage) {
            (Some(priority), Some(stage)) => {
                debug!(stage = %spec.name, priority, "registered stage");
                self.register(spec.name, priority, stage);
                true
            }
            (None, _) => {
                warn!(stage = %spec.name, "dropping stage without a priority");
                false
            }
            (_, None) => {
                warn!(stage = %spec.name, "dropping stage: unknown or invalid `use` value");
                false
            }
        }
    }

    /// Stage names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Apply every stage to `ctx` in order, stopping at the first failure.
    pub fn run<C: ?Sized>(
        &self,
        ctx: &mut C,
        mut apply: impl FnMut(&S, &mut C) -> StageResult,
    ) -> Result<(), StageError> {
        for registered in &self.stages {
            apply(&*registered.stage, ctx).map_err(|source| StageError {
                stage: registered.name.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Push: Send + Sync {
        fn push(&self, out: &mut Vec<String>) -> StageResult;
    }

    struct Named(&'static str);

    impl Push for Named {
        fn push(&self, out: &mut Vec<String>) -> StageResult {
            out.push(self.0.to_string());
            Ok(())
        }
    }

    struct Fails;

    impl Push for Fails {
        fn push(&self, _out: &mut Vec<String>) -> StageResult {
            Err("boom".into())
        }
    }

    fn run(pipeline: &Pipeline<dyn Push>) -> Result<Vec<String>, StageError> {
        let mut out = Vec::new();
        pipeline.run(&mut out, |stage, out| stage.push(out))?;
        Ok(out)
    }

    #[test]
    fn stages_run_in_descending_priority() {
        let mut p: Pipeline<dyn Push> = Pipeline::new();
        p.register("render", -100, Box::new(Named("render")));
        p.register("parse", 100, Box::new(Named("parse")));
        p.register("paths", 50, Box::new(Named("paths")));

        assert_eq!(run(&p).unwrap(), vec!["parse", "paths", "render"]);
    }

    #[test]
    fn equal_priorities_keep_registration_order() {
        let mut p: Pipeline<dyn Push> = Pipeline::new();
        p.register("draft", 50, Box::new(Named("draft")));
        p.register("paths", 50, Box::new(Named("paths")));
        p.register("custom", 50, Box::new(Named("custom")));

        assert_eq!(p.names(), vec!["draft", "paths", "custom"]);
    }

    #[test]
    fn specs_without_priority_or_stage_are_dropped() {
        let mut p: Pipeline<dyn Push> = Pipeline::new();
        assert!(p.register_spec(StageSpec::new("ok", 10, Box::new(Named("ok")) as Box<dyn Push>)));
        assert!(!p.register_spec(StageSpec {
            name: "no-priority".into(),
            priority: None,
            stage: Some(Box::new(Named("x")) as Box<dyn Push>),
        }));
        assert!(!p.register_spec(StageSpec {
            name: "unknown".into(),
            priority: Some(5),
            stage: None,
        }));

        assert_eq!(p.len(), 1);
    }

    #[test]
    fn failure_names_the_stage_and_stops() {
        let mut p: Pipeline<dyn Push> = Pipeline::new();
        p.register("first", 10, Box::new(Named("first")));
        p.register("broken", 5, Box::new(Fails));
        p.register("never", 0, Box::new(Named("never")));

        let err = run(&p).unwrap_err();
        assert_eq!(err.stage, "broken");
        assert!(err.to_string().contains("boom"));
    }
}
