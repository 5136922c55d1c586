//! Fork-join execution
//!
//! A `fork ... end fork` block does not run inline. Its statement range is
//! packaged with a snapshot of the visible variables into a [`SubContext`]
//! and parked on the frame that reached it. `join`, the end of the frame, or
//! a `return` hands the parked batch to a [`ParallelExecutor`] and blocks
//! until every sub-context has finished.
//!
//! Sub-contexts run on their own interpreter with their own context stack.
//! Nothing they assign flows back into the forking script; shared state is
//! the host's to synchronize. When the forking frame captures output, each
//! sub-context buffers its lines and the join replays them into that buffer
//! in submission order.

use crate::interpreter::context::{ContextId, Frame, FrameKind};
use crate::interpreter::errors::{ScriptError, ScriptResult};
use crate::interpreter::jumps::Program;
use crate::interpreter::types::{ControlSignal, Value};
use crate::interpreter::vm::{Interpreter, Runtime};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/* ===================== Sub-Context ===================== */

/// A deferred fork block, ready to run on any thread
pub struct SubContext {
    pub name: String,
    runtime: Runtime,
    program: Arc<Program>,
    start: usize,
    end: usize,
    bindings: HashMap<String, Value>,
    /// Collect output for the forking frame's capture buffer
    capture: bool,
}

impl fmt::Debug for SubContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubContext")
            .field("name", &self.name)
            .field("script", &self.program.name())
            .field("start", &self.start)
            .field("end", &self.end)
            .field("bindings", &self.bindings.len())
            .field("capture", &self.capture)
            .finish()
    }
}

impl SubContext {
    pub fn new(
        name: String,
        runtime: Runtime,
        program: Arc<Program>,
        start: usize,
        end: usize,
        bindings: HashMap<String, Value>,
    ) -> Self {
        Self {
            name,
            runtime,
            program,
            start,
            end,
            bindings,
            capture: false,
        }
    }

    /// Buffer output instead of sending it to the host
    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    /// Run the block to completion on a fresh interpreter
    ///
    /// Returns the captured output lines, empty unless capturing.
    pub fn run(self) -> ScriptResult<Vec<String>> {
        let mut runtime = self.runtime;
        // nested forks join inline on the worker
        runtime.executor = Arc::new(SequentialExecutor);
        let mut worker = Interpreter::from_runtime(runtime);

        let mut frame = Frame::new(FrameKind::Fork, self.program, self.start, self.end).function(self.name.clone());
        if self.capture {
            frame = frame.capture_output();
        }
        let frame_id = worker.stack.push_frame(frame, false)?;
        for (name, value) in self.bindings {
            worker.declare_variable(&name, value)?;
        }
        let outcome = worker.dispatch();
        let output = worker
            .stack
            .frame_mut(frame_id)
            .and_then(|f| f.output.take())
            .unwrap_or_default();
        worker.stack.pop(false);

        match outcome? {
            ControlSignal::Break(_) => Err(ScriptError::bad_context("break")),
            ControlSignal::ContinueLoop(_) => Err(ScriptError::bad_context("continue")),
            _ => Ok(output),
        }
    }
}

/// Result of one sub-context, tagged with its position in the batch
#[derive(Debug)]
pub struct ForkOutcome {
    pub index: usize,
    pub name: String,
    /// Lines captured by the sub-context
    pub output: Vec<String>,
    pub result: ScriptResult<()>,
}

fn run_one(index: usize, sub: SubContext) -> ForkOutcome {
    let name = sub.name.clone();
    debug!(fork = %name, "sub-context started");
    let (output, result) = match sub.run() {
        Ok(output) => (output, Ok(())),
        Err(err) => (Vec::new(), Err(err)),
    };
    ForkOutcome {
        index,
        name,
        output,
        result,
    }
}

/* ===================== Executors ===================== */

/// Runs a batch of sub-contexts and returns once all of them are done
pub trait ParallelExecutor: Send + Sync {
    fn execute(&self, batch: Vec<SubContext>) -> Vec<ForkOutcome>;
}

/// Runs the batch in submission order on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialExecutor;

impl ParallelExecutor for SequentialExecutor {
    fn execute(&self, batch: Vec<SubContext>) -> Vec<ForkOutcome> {
        batch
            .into_iter()
            .enumerate()
            .map(|(index, sub)| run_one(index, sub))
            .collect()
    }
}

/// Runs each sub-context on a blocking task of a private tokio runtime
pub struct TokioExecutor {
    runtime: tokio::runtime::Runtime,
}

impl fmt::Debug for TokioExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioExecutor").finish_non_exhaustive()
    }
}

impl TokioExecutor {
    pub fn new(worker_threads: usize) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("molscript-fork")
            .enable_all()
            .build()?;
        Ok(Self { runtime })
    }
}

impl ParallelExecutor for TokioExecutor {
    fn execute(&self, batch: Vec<SubContext>) -> Vec<ForkOutcome> {
        if tokio::runtime::Handle::try_current().is_ok() {
            // block_on would panic inside another runtime
            warn!(count = batch.len(), "fork batch joined inside an async runtime, running sequentially");
            return SequentialExecutor.execute(batch);
        }

        self.runtime.block_on(async move {
            let total = batch.len();
            let mut tasks = tokio::task::JoinSet::new();
            for (index, sub) in batch.into_iter().enumerate() {
                tasks.spawn_blocking(move || run_one(index, sub));
            }

            let mut outcomes = Vec::with_capacity(total);
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => outcomes.push(ForkOutcome {
                        index: total,
                        name: "fork".to_string(),
                        output: Vec::new(),
                        result: Err(ScriptError::evaluation(format!("fork worker failed: {}", e))),
                    }),
                }
            }
            outcomes
        })
    }
}

/* ===================== Join ===================== */

impl Interpreter {
    /// Run and wait for every fork parked on `frame_id`
    ///
    /// The first failure in submission order is returned once the whole
    /// batch has finished.
    pub(crate) fn join_pending(&mut self, frame_id: ContextId) -> ScriptResult<()> {
        let Some(frame) = self.stack.frame_mut(frame_id) else {
            return Ok(());
        };
        if frame.pending_forks.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut frame.pending_forks);
        let parallel = frame.parallel;
        debug!(count = batch.len(), parallel, "joining forks");

        let mut outcomes = if parallel {
            self.runtime.executor.execute(batch)
        } else {
            SequentialExecutor.execute(batch)
        };
        outcomes.sort_by_key(|o| o.index);

        let mut first = None;
        for outcome in outcomes {
            for line in &outcome.output {
                self.emit_output(line);
            }
            if let Err(err) = outcome.result {
                warn!(fork = %outcome.name, "sub-context failed: {}", err.message);
                first.get_or_insert(err);
            }
        }
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
