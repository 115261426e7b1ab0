// src/core/executor.rs

use crate::{
    core::{
        binder::{BindError, BoundArguments, ParameterBinder},
        cancellation::CancellationToken,
        command::{Command, CommandError, ExecutionContext},
        command_line::{CommandLine, parse},
        converter::ValueConverter,
        registry::{CommandDescriptor, CommandResolver, Registry},
        tokenizer::TokenizeError,
    },
};
use colored::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;
use uuid::Uuid;

/// The phase of an invocation that rejected the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Parse,
    Resolve,
    Bind,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parse => "parse",
            Self::Resolve => "resolve",
            Self::Bind => "bind",
        })
    }
}

/// A failure that stopped an invocation before any command body ran.
#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("Could not parse the input: {0}")]
    Parse(#[from] TokenizeError),
    #[error("Pipeline segment {segment} has no command name.")]
    InvalidCommandLine { segment: usize },
    #[error("Command '{0}' not found.")]
    CommandNotFound(String),
    #[error(transparent)]
    Bind(#[from] BindError),
}

impl InvocationError {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Parse(_) | Self::InvalidCommandLine { .. } => Phase::Parse,
            Self::CommandNotFound(_) => Phase::Resolve,
            Self::Bind(_) => Phase::Bind,
        }
    }
}

/// A command body that returned an error while running.
#[derive(Debug)]
pub struct ExecutionFault {
    pub command: String,
    /// 0-based index of the command's segment in the pipeline.
    pub segment: usize,
    pub concurrent: bool,
    pub error: anyhow::Error,
}

impl fmt::Display for ExecutionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command '{}' (segment {}) failed: {:#}", self.command, self.segment, self.error)
    }
}

/// How an invocation ended.
#[derive(Debug)]
pub enum Outcome {
    /// Every command ran to completion.
    Completed,
    /// At least one command was cancelled or skipped, and none faulted.
    Cancelled,
    /// At least one command body failed.
    Faulted(Vec<ExecutionFault>),
}

/// What an invocation did.
#[derive(Debug)]
pub struct ExecutionReport {
    pub invocation: Uuid,
    /// Names of the commands that completed: sequential ones in pipeline order, then
    /// concurrent ones in completion order.
    pub executed: Vec<String>,
    /// Names of the commands that were cancelled or never started.
    pub cancelled: Vec<String>,
    pub outcome: Outcome,
}

impl ExecutionReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, Outcome::Completed)
    }

    pub fn faults(&self) -> &[ExecutionFault] {
        match &self.outcome {
            Outcome::Faulted(faults) => faults,
            _ => &[],
        }
    }

    /// Process exit code: 0 completed, 130 cancelled, 1 faulted.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            Outcome::Completed => 0,
            Outcome::Cancelled => 130,
            Outcome::Faulted(_) => 1,
        }
    }
}

/// One bound, ready-to-run pipeline entry.
pub struct Executable {
    descriptor: Arc<CommandDescriptor>,
    command: Box<dyn Command>,
    line: CommandLine,
    arguments: BoundArguments,
    segment: usize,
    is_async: bool,
}

impl fmt::Debug for Executable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executable")
            .field("command", &self.descriptor.name())
            .field("segment", &self.segment)
            .field("is_async", &self.is_async)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

impl Executable {
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn arguments(&self) -> &BoundArguments {
        &self.arguments
    }

    pub fn line(&self) -> &CommandLine {
        &self.line
    }
}

/// Completion bookkeeping shared by the sequential phase and the workers.
#[derive(Debug, Default)]
struct RunState {
    executed: Vec<String>,
    cancelled: Vec<String>,
    faults: Vec<ExecutionFault>,
}

/// Parses, binds and runs pipelines against a command resolver.
///
/// Sequential commands run on the calling thread in pipeline order. Commands bound
/// with `-async` are submitted to a fixed-size worker pool only after the sequential
/// phase has finished, so a sequential fault can still prevent them from starting.
pub struct Executor {
    resolver: Arc<dyn CommandResolver>,
    converter: Arc<dyn ValueConverter>,
    pool: ThreadPool,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("converter", &self.converter)
            .field("concurrency", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl Executor {
    pub fn new(
        resolver: Arc<dyn CommandResolver>,
        converter: Arc<dyn ValueConverter>,
        concurrency: usize,
    ) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .thread_name(|i| format!("commander-worker-{}", i))
            .build()?;
        Ok(Self {
            resolver,
            converter,
            pool,
        })
    }

    /// An executor resolving against `registry` with the registry's own converter.
    pub fn for_registry(registry: Arc<Registry>, concurrency: usize) -> Result<Self, ThreadPoolBuildError> {
        let converter = registry.converter().clone();
        Self::new(registry, converter, concurrency)
    }

    pub fn concurrency(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `input`, reporting faults only through the log.
    pub fn execute(
        &self,
        input: &str,
        cancellation: &CancellationToken,
    ) -> Result<ExecutionReport, InvocationError> {
        self.execute_with(input, cancellation, &|fault: &ExecutionFault| log::error!("{}", fault))
    }

    /// Runs `input`, calling `on_error` for every command body that fails.
    pub fn execute_with(
        &self,
        input: &str,
        cancellation: &CancellationToken,
        on_error: &(dyn Fn(&ExecutionFault) + Sync),
    ) -> Result<ExecutionReport, InvocationError> {
        let executables = self.prepare(input)?;
        Ok(self.run(executables, cancellation, on_error))
    }

    /// Parses, resolves and binds every pipeline entry without running anything.
    pub fn prepare(&self, input: &str) -> Result<Vec<Executable>, InvocationError> {
        let pipeline = parse(input)?;

        let resolved = pipeline
            .into_iter()
            .enumerate()
            .map(|(segment, line)| -> Result<_, InvocationError> {
                let name = line
                    .command_name()
                    .ok_or(InvocationError::InvalidCommandLine { segment })?;
                let descriptor = self
                    .resolver
                    .lookup(name)
                    .ok_or_else(|| InvocationError::CommandNotFound(name.to_string()))?;
                Ok((segment, line, descriptor))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let binder = ParameterBinder::new(self.converter.as_ref());
        resolved
            .into_iter()
            .map(|(segment, line, descriptor)| -> Result<Executable, InvocationError> {
                let bound = binder.bind(&descriptor, &line, descriptor.instantiate())?;
                let is_async = descriptor
                    .async_parameter()
                    .is_some_and(|p| bound.arguments.flag(p.property()));
                Ok(Executable {
                    command: bound.command,
                    arguments: bound.arguments,
                    descriptor,
                    line,
                    segment,
                    is_async,
                })
            })
            .collect()
    }

    /// Runs already-bound executables under a signal scoped to this call.
    pub fn run(
        &self,
        executables: Vec<Executable>,
        cancellation: &CancellationToken,
        on_error: &(dyn Fn(&ExecutionFault) + Sync),
    ) -> ExecutionReport {
        let invocation = Uuid::new_v4();
        let signal = cancellation.child();
        let state = Mutex::new(RunState::default());

        let (concurrent, sequential): (Vec<_>, Vec<_>) =
            executables.into_iter().partition(Executable::is_async);
        log::debug!(
            "[{}] Running {} sequential and {} concurrent command(s).",
            invocation,
            sequential.len(),
            concurrent.len()
        );

        // --- Sequential phase ---
        for executable in sequential {
            if signal.is_cancelled() {
                log::debug!("[{}] Skipping '{}': cancelled.", invocation, executable.name());
                lock(&state).cancelled.push(executable.name().to_string());
                continue;
            }
            if let Some(fault) = run_one(invocation, executable, &signal, &state, false) {
                signal.cancel();
                report_fault(fault, &state, on_error);
            }
        }

        // --- Concurrent phase ---
        if !concurrent.is_empty() {
            let signal = &signal;
            let state = &state;
            self.pool.scope(|s| {
                for executable in concurrent {
                    s.spawn(move |_| {
                        if signal.is_cancelled() {
                            log::debug!("[{}] Not starting '{}': cancelled.", invocation, executable.name());
                            lock(state).cancelled.push(executable.name().to_string());
                            return;
                        }
                        if let Some(fault) = run_one(invocation, executable, signal, state, true) {
                            report_fault(fault, state, on_error);
                        }
                    });
                }
            });
        }

        let RunState {
            executed,
            cancelled,
            faults,
        } = state.into_inner().unwrap_or_else(PoisonError::into_inner);

        let outcome = if !faults.is_empty() {
            Outcome::Faulted(faults)
        } else if !cancelled.is_empty() {
            Outcome::Cancelled
        } else {
            Outcome::Completed
        };
        log::debug!(
            "[{}] Finished: {} executed, {} cancelled, outcome {}.",
            invocation,
            executed.len(),
            cancelled.len(),
            match &outcome {
                Outcome::Completed => "completed".green(),
                Outcome::Cancelled => "cancelled".yellow(),
                Outcome::Faulted(_) => "faulted".red(),
            }
        );

        ExecutionReport {
            invocation,
            executed,
            cancelled,
            outcome,
        }
    }
}

fn lock(state: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs one body and records its completion or cancellation. Returns the fault, if any,
/// so the caller can apply the sequential or concurrent fault policy.
fn run_one(
    invocation: Uuid,
    mut executable: Executable,
    signal: &CancellationToken,
    state: &Mutex<RunState>,
    concurrent: bool,
) -> Option<ExecutionFault> {
    let name = executable.name().to_string();
    log::debug!(
        "[{}] Starting '{}' ({}).",
        invocation,
        name,
        if concurrent { "concurrent" } else { "sequential" }
    );
    let ctx = ExecutionContext::new(invocation, &name, &executable.line, signal);
    match executable.command.execute(&ctx) {
        Ok(()) => {
            log::debug!("[{}] '{}' completed.", invocation, name);
            lock(state).executed.push(name);
            None
        }
        Err(CommandError::Cancelled) => {
            log::warn!("[{}] '{}' was cancelled.", invocation, name);
            lock(state).cancelled.push(name);
            None
        }
        Err(CommandError::Failed(error)) => Some(ExecutionFault {
            command: name,
            segment: executable.segment,
            concurrent,
            error,
        }),
    }
}

fn report_fault(
    fault: ExecutionFault,
    state: &Mutex<RunState>,
    on_error: &(dyn Fn(&ExecutionFault) + Sync),
) {
    log::debug!("{}", fault);
    on_error(&fault);
    lock(state).faults.push(fault);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        converter::{DefaultConverter, Value, ValueType},
        registry::ParameterDescriptor,
    };
    use anyhow::anyhow;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    type Journal = Arc<Mutex<Vec<String>>>;

    /// What a test command does when executed.
    #[derive(Clone, Copy)]
    enum Behavior {
        Record,
        Fail,
        /// Sleeps cooperatively, tracking how many instances overlap.
        Slow,
        /// Cancels the invocation signal from inside the body.
        Stop,
    }

    struct Probe {
        name: &'static str,
        behavior: Behavior,
        journal: Journal,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Command for Probe {
        fn assign(&mut self, parameter: &str, _value: Value) -> Result<(), BindError> {
            match parameter {
                "value" | "background" => Ok(()),
                other => Err(BindError::UnknownParameter(other.to_string())),
            }
        }

        fn execute(&mut self, ctx: &ExecutionContext<'_>) -> Result<(), CommandError> {
            match self.behavior {
                Behavior::Record => {}
                Behavior::Fail => return Err(anyhow!("{} failed", self.name).into()),
                Behavior::Slow => {
                    let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                    self.peak.fetch_max(now, Ordering::SeqCst);
                    let slept = ctx.sleep(Duration::from_millis(60));
                    self.running.fetch_sub(1, Ordering::SeqCst);
                    slept?;
                }
                Behavior::Stop => {
                    ctx.cancellation().cancel();
                    ctx.check_cancelled()?;
                }
            }
            self.journal.lock().unwrap().push(self.name.to_string());
            Ok(())
        }
    }

    struct Fixture {
        executor: Executor,
        journal: Journal,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    fn fixture(concurrency: usize) -> Fixture {
        let journal: Journal = Arc::default();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new(Arc::new(DefaultConverter::new()));

        let commands = [
            ("a", Behavior::Record),
            ("b", Behavior::Record),
            ("c", Behavior::Record),
            ("fail", Behavior::Fail),
            ("slow", Behavior::Slow),
            ("stop", Behavior::Stop),
        ];
        for (name, behavior) in commands {
            let (journal, running, peak) = (journal.clone(), running.clone(), peak.clone());
            registry
                .register(CommandDescriptor::new(name, move || {
                    Box::new(Probe {
                        name,
                        behavior,
                        journal: journal.clone(),
                        running: running.clone(),
                        peak: peak.clone(),
                    })
                }))
                .unwrap();
        }
        let (journal_r, running_r, peak_r) = (journal.clone(), running.clone(), peak.clone());
        let (journal_bg, running_bg, peak_bg) = (journal.clone(), running.clone(), peak.clone());
        registry
            .register(
                CommandDescriptor::new("bg", move || {
                    Box::new(Probe {
                        name: "bg",
                        behavior: Behavior::Record,
                        journal: journal_bg.clone(),
                        running: running_bg.clone(),
                        peak: peak_bg.clone(),
                    })
                })
                .parameter(ParameterDescriptor::new("background", ValueType::Bool).alias("async")),
            )
            .unwrap();
        registry
            .register(
                CommandDescriptor::new("req", move || {
                    Box::new(Probe {
                        name: "req",
                        behavior: Behavior::Record,
                        journal: journal_r.clone(),
                        running: running_r.clone(),
                        peak: peak_r.clone(),
                    })
                })
                .parameter(ParameterDescriptor::new("value", ValueType::String).required()),
            )
            .unwrap();

        Fixture {
            executor: Executor::for_registry(Arc::new(registry), concurrency).unwrap(),
            journal,
            running,
            peak,
        }
    }

    impl Fixture {
        fn journal(&self) -> Vec<String> {
            self.journal.lock().unwrap().clone()
        }
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pipeline_split_runs_in_order() {
        let f = fixture(2);
        let report = f.executor.execute("a|b", &CancellationToken::new()).unwrap();
        assert!(report.is_completed());
        assert_eq!(report.executed, names(&["a", "b"]));
        assert_eq!(f.journal(), names(&["a", "b"]));
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_empty_input_completes_with_nothing() {
        let f = fixture(1);
        let report = f.executor.execute("  ", &CancellationToken::new()).unwrap();
        assert!(report.is_completed());
        assert!(report.executed.is_empty());
    }

    #[test]
    fn test_unknown_command_aborts_before_execution() {
        let f = fixture(1);
        let err = f.executor.execute("a | missing", &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, InvocationError::CommandNotFound(ref n) if n == "missing"));
        assert_eq!(err.phase(), Phase::Resolve);
        assert!(f.journal().is_empty());
    }

    #[test]
    fn test_line_without_command_name_is_invalid() {
        let f = fixture(1);
        let err = f.executor.execute("a | -flag x", &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, InvocationError::InvalidCommandLine { segment: 1 }));
        assert_eq!(err.phase(), Phase::Parse);
    }

    #[test]
    fn test_unterminated_quote_is_a_parse_failure() {
        let f = fixture(1);
        let err = f.executor.execute("a \"b", &CancellationToken::new()).unwrap_err();
        assert_eq!(err.phase(), Phase::Parse);
    }

    #[test]
    fn test_required_missing_fails_before_any_body_runs() {
        let f = fixture(1);
        let err = f.executor.execute("a | req", &CancellationToken::new()).unwrap_err();
        assert!(matches!(
            err,
            InvocationError::Bind(BindError::RequiredParameterMissing { .. })
        ));
        assert_eq!(err.phase(), Phase::Bind);
        assert!(f.journal().is_empty());

        let report = f.executor.execute("req -value x", &CancellationToken::new()).unwrap();
        assert!(report.is_completed());
    }

    #[test]
    fn test_concurrent_commands_run_after_sequential_ones() {
        let f = fixture(2);
        let report = f
            .executor
            .execute("a -async | b | c", &CancellationToken::new())
            .unwrap();
        assert!(report.is_completed());
        assert_eq!(f.journal(), names(&["b", "c", "a"]));
    }

    #[test]
    fn test_sequential_fault_cancels_remaining_work() {
        let f = fixture(2);
        let reported = AtomicUsize::new(0);
        let report = f
            .executor
            .execute_with("a | fail | b | c -async", &CancellationToken::new(), &|fault: &ExecutionFault| {
                assert_eq!(fault.command, "fail");
                assert!(!fault.concurrent);
                reported.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(reported.load(Ordering::SeqCst), 1);
        assert_eq!(report.executed, names(&["a"]));
        let mut cancelled = report.cancelled.clone();
        cancelled.sort();
        assert_eq!(cancelled, names(&["b", "c"]));
        assert_eq!(report.faults().len(), 1);
        assert_eq!(report.faults()[0].segment, 1);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_concurrent_fault_does_not_cancel_siblings() {
        let f = fixture(4);
        let reported = AtomicUsize::new(0);
        let report = f
            .executor
            .execute_with(
                "fail -async | slow -async | slow -async | a -async",
                &CancellationToken::new(),
                &|fault: &ExecutionFault| {
                    assert!(fault.concurrent);
                    reported.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();

        assert_eq!(reported.load(Ordering::SeqCst), 1);
        assert!(report.cancelled.is_empty());
        let mut executed = report.executed.clone();
        executed.sort();
        assert_eq!(executed, names(&["a", "slow", "slow"]));
        assert!(matches!(report.outcome, Outcome::Faulted(ref faults) if faults.len() == 1));
    }

    #[test]
    fn test_outer_cancellation_skips_everything() {
        let f = fixture(2);
        let outer = CancellationToken::new();
        outer.cancel();
        let report = f.executor.execute("a | b -async", &outer).unwrap();
        assert!(matches!(report.outcome, Outcome::Cancelled));
        assert!(report.executed.is_empty());
        assert_eq!(report.cancelled.len(), 2);
        assert_eq!(report.exit_code(), 130);
    }

    #[test]
    fn test_cancellation_from_a_body_is_not_a_fault() {
        let f = fixture(2);
        let outer = CancellationToken::new();
        let report = f.executor.execute("a | stop | b", &outer).unwrap();
        assert!(matches!(report.outcome, Outcome::Cancelled));
        assert_eq!(report.executed, names(&["a"]));
        assert_eq!(report.cancelled, names(&["stop", "b"]));
        assert!(!outer.is_cancelled());
    }

    #[test]
    fn test_worker_pool_bounds_concurrency() {
        let f = fixture(2);
        let report = f
            .executor
            .execute(
                "slow -async | slow -async | slow -async | slow -async | slow -async",
                &CancellationToken::new(),
            )
            .unwrap();
        assert!(report.is_completed());
        assert_eq!(report.executed.len(), 5);
        assert!(f.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(f.executor.concurrency(), 2);
    }

    #[test]
    fn test_prepare_classifies_async() {
        let f = fixture(1);
        let executables = f.executor.prepare("a | b -async | c -async false").unwrap();
        let classes: Vec<_> = executables.iter().map(|e| (e.name(), e.is_async())).collect();
        assert_eq!(classes, vec![("a", false), ("b", true), ("c", false)]);
        assert!(f.journal().is_empty());
    }

    #[test]
    fn test_async_flag_declared_under_another_name_schedules_concurrently() {
        let f = fixture(1);
        let executables = f.executor.prepare("bg -async | bg -background | bg").unwrap();
        let classes: Vec<_> = executables.iter().map(Executable::is_async).collect();
        assert_eq!(classes, vec![true, true, false]);
        assert!(executables[0].arguments().flag("background"));

        let report = f.executor.execute("bg -async | a", &CancellationToken::new()).unwrap();
        assert_eq!(report.executed, names(&["a", "bg"]));
    }

    #[test]
    fn test_cancellation_while_workers_run() {
        let f = fixture(1);
        let outer = CancellationToken::new();
        let canceller = {
            let outer = outer.clone();
            let running = f.running.clone();
            std::thread::spawn(move || {
                while running.load(Ordering::SeqCst) == 0 {
                    std::thread::sleep(Duration::from_millis(1));
                }
                outer.cancel();
            })
        };

        let report = f
            .executor
            .execute("slow -async | slow -async | slow -async", &outer)
            .unwrap();
        canceller.join().unwrap();

        assert!(matches!(report.outcome, Outcome::Cancelled));
        assert!(report.executed.is_empty());
        assert_eq!(report.cancelled, names(&["slow", "slow", "slow"]));
        assert!(f.journal().is_empty());
        assert_eq!(f.peak.load(Ordering::SeqCst), 1);
        assert_eq!(report.exit_code(), 130);
    }
}
