// src/plan/pipeline.rs

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::PlanFile;
use crate::dag::Fragment;
use crate::engine::{ExecutionContext, GraphExecutor};
use crate::errors::{HostdagError, Result};
use crate::plan::bom::{StaticBom, VersionResolver};
use crate::plan::config_task::ConfigTask;
use crate::plan::module::Module;
use crate::result::PipelineResult;
use crate::types::Status;

/// Ordered modules, run one after the other.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    modules: Vec<Module>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modules: Vec::new(),
        }
    }

    pub fn with_module(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    /// Build the pipeline described by a plan file: one module per entry of
    /// its module order, each holding that module's [`ConfigTask`]s.
    pub fn from_plan(plan: &PlanFile) -> Self {
        let resolver: Arc<dyn VersionResolver> = Arc::new(StaticBom::from_plan(plan));
        let mut pipeline = Self::new(plan.config.name.clone());

        for module_name in plan.module_order() {
            let mut module = Module::new(module_name.clone());
            for (task_name, task_cfg) in plan.tasks_in_module(&module_name) {
                let task = ConfigTask::new(task_name.clone(), task_cfg.clone()).with_bom(
                    plan.config.cluster_version.clone(),
                    Arc::clone(&resolver),
                );
                module.add_task(Arc::new(task));
            }
            pipeline.modules.push(module);
        }
        pipeline
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Keep only the named module.
    pub fn retain_module(&mut self, name: &str) -> Result<()> {
        if !self.modules.iter().any(|m| m.name() == name) {
            return Err(HostdagError::ConfigError(format!(
                "unknown module '{name}' in pipeline '{}'",
                self.name
            )));
        }
        self.modules.retain(|m| m.name() == name);
        Ok(())
    }

    /// Plan every module and chain them into one graph: the exits of each
    /// non-empty module gate the entries of the next.
    ///
    /// Gates are evaluated against the caches as they are now, so this is a
    /// preview; [`Pipeline::run`] replans each module right before it runs.
    pub fn plan(&self, ctx: &dyn ExecutionContext) -> Result<Fragment> {
        let mut graph = Fragment::new(self.name.clone());
        for module in &self.modules {
            let fragment = module.plan(ctx)?;
            if fragment.is_empty() {
                continue;
            }
            graph.then(fragment)?;
        }
        Ok(graph)
    }

    /// Plan and execute the modules in order.
    ///
    /// Stops after the first module that ends `Failed`, or once the run is
    /// cancelled. Planning and graph-validity errors abort the pipeline.
    pub async fn run(
        &self,
        executor: &GraphExecutor,
        ctx: Arc<dyn ExecutionContext>,
    ) -> Result<PipelineResult> {
        let mut result = PipelineResult::new(self.name.clone());
        ctx.caches().pipeline().clear();
        info!(pipeline = %self.name, modules = self.modules.len(), "pipeline started");

        for module in &self.modules {
            if ctx.cancellation().is_cancelled() {
                warn!(pipeline = %self.name, module = module.name(), "run cancelled; remaining modules not started");
                break;
            }

            ctx.caches().module().clear();
            let fragment = module.plan(ctx.as_ref())?;
            let graph = executor.execute(fragment, Arc::clone(&ctx)).await?;
            let status = graph.status;
            result.modules.push(graph);
            result.refresh_status();

            if status == Status::Failed {
                warn!(pipeline = %self.name, module = module.name(), "module failed; stopping pipeline");
                break;
            }
        }

        let status = result.refresh_status();
        info!(pipeline = %self.name, status = %status, "pipeline finished");
        Ok(result)
    }
}
