use std::fmt;

use super::{AbortFlag, Classification, WorkItem};

type SetupFn = Box<dyn FnMut(&AbortFlag) -> anyhow::Result<()> + Send>;
type ExecuteFn = Box<dyn FnMut(&AbortFlag) -> anyhow::Result<()> + Send>;
type TeardownFn = Box<dyn FnMut(&AbortFlag) + Send>;

/// Closure-backed [`WorkItem`].
///
/// Each phase receives the item's abort flag; `execute` should poll it and
/// `teardown` can read it to tell a cancelled run from a finished one.
pub struct Task {
    name: String,
    classification: Classification,
    abort: AbortFlag,
    setup: Option<SetupFn>,
    execute: ExecuteFn,
    teardown: Option<TeardownFn>,
}

impl Task {
    /// Starts a builder for a task of the given class.
    pub fn builder(classification: Classification) -> TaskBuilder {
        TaskBuilder {
            name: None,
            classification,
            abort: AbortFlag::new(),
            setup: None,
            teardown: None,
        }
    }

    /// Task with only an execute phase.
    pub fn new<F>(classification: Classification, execute: F) -> Self
    where
        F: FnMut(&AbortFlag) -> anyhow::Result<()> + Send + 'static,
    {
        Self::builder(classification).execute(execute)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("classification", &self.classification)
            .field("abort", &self.abort)
            .field("has_setup", &self.setup.is_some())
            .field("has_teardown", &self.teardown.is_some())
            .finish()
    }
}

impl WorkItem for Task {
    fn classification(&self) -> Classification {
        self.classification
    }

    fn abort_flag(&self) -> &AbortFlag {
        &self.abort
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self) -> anyhow::Result<()> {
        match self.setup.as_mut() {
            Some(setup) => setup(&self.abort),
            None => Ok(()),
        }
    }

    fn execute(&mut self) -> anyhow::Result<()> {
        (self.execute)(&self.abort)
    }

    fn teardown(&mut self) {
        if let Some(teardown) = self.teardown.as_mut() {
            teardown(&self.abort);
        }
    }
}

/// Assembles a [`Task`]; [`execute`](Self::execute) finishes it.
pub struct TaskBuilder {
    name: Option<String>,
    classification: Classification,
    abort: AbortFlag,
    setup: Option<SetupFn>,
    teardown: Option<TeardownFn>,
}

impl fmt::Debug for TaskBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskBuilder")
            .field("name", &self.name)
            .field("classification", &self.classification)
            .finish_non_exhaustive()
    }
}

impl TaskBuilder {
    /// Log name. Defaults to `<class>-task`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Shares an existing flag instead of creating a fresh one.
    pub fn abort_flag(mut self, abort: AbortFlag) -> Self {
        self.abort = abort;
        self
    }

    /// Setup phase, run on the admitting thread.
    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: FnMut(&AbortFlag) -> anyhow::Result<()> + Send + 'static,
    {
        self.setup = Some(Box::new(setup));
        self
    }

    /// Teardown phase, run on the owner thread.
    pub fn teardown<F>(mut self, teardown: F) -> Self
    where
        F: FnMut(&AbortFlag) + Send + 'static,
    {
        self.teardown = Some(Box::new(teardown));
        self
    }

    /// Main phase. Finishes the builder.
    pub fn execute<F>(self, execute: F) -> Task
    where
        F: FnMut(&AbortFlag) -> anyhow::Result<()> + Send + 'static,
    {
        let classification = self.classification;
        Task {
            name: self
                .name
                .unwrap_or_else(|| format!("{classification}-task")),
            classification,
            abort: self.abort,
            setup: self.setup,
            execute: Box::new(execute),
            teardown: self.teardown,
        }
    }
}
