// src/plan/module.rs

use std::fmt;
use std::sync::Arc;

use crate::dag::{merge_all, Fragment};
use crate::engine::ExecutionContext;
use crate::errors::Result;
use crate::plan::task::{plan_task, Task};

/// A named group of tasks whose fragments are merged side by side.
///
/// Tasks in a module only wait on each other through edges they build
/// themselves; the module adds none.
#[derive(Clone)]
pub struct Module {
    name: String,
    tasks: Vec<Arc<dyn Task>>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: impl Task + 'static) -> Self {
        self.tasks.push(Arc::new(task));
        self
    }

    pub fn add_task(&mut self, task: Arc<dyn Task>) {
        self.tasks.push(task);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tasks(&self) -> impl Iterator<Item = &dyn Task> {
        self.tasks.iter().map(|t| t.as_ref())
    }

    pub fn plan(&self, ctx: &dyn ExecutionContext) -> Result<Fragment> {
        let fragments = self
            .tasks
            .iter()
            .map(|task| plan_task(task.as_ref(), ctx))
            .collect::<Result<Vec<_>>>()?;
        merge_all(self.name.clone(), fragments)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.tasks.iter().map(|t| t.name()).collect();
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("tasks", &names)
            .finish()
    }
}
