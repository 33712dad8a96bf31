//! Cooperative scheduler for independently clocked execution contexts.
//!
//! Every emulated chip (main CPU, audio CPU, video, DSP, cartridge
//! coprocessors) owns an [`ExecutionContext`]: an identity, a clock rate and a
//! monotonically increasing count of local cycles. The [`Scheduler`] never owns
//! those contexts. It holds [`ThreadId`] handles and resumes them through the
//! [`Machine`] trait, one atomic step at a time, until some component raises
//! an [`ExitReason`].
//!
//! # Synchronization modes
//!
//! - [`SyncMode::None`]: the primary context free-runs. After every primary
//!   step the other contexts are caught up until none of them is behind the
//!   primary in absolute emulated time. Control returns when a component
//!   raises [`ExitReason::FrameEvent`].
//! - [`SyncMode::LockToReference`]: only the designated target context is
//!   stepped, until it reaches the reference context's position. Control then
//!   returns with [`ExitReason::SynchronizeEvent`]. Draining each context this
//!   way, one at a time, is how a machine is brought to a single consistent
//!   instant before its state is captured.
//!
//! Exit requests are only honoured between steps, so a context is never
//! suspended in the middle of a unit of work.

use crate::logging::{log, LogCategory, LogLevel};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Maximum number of steps a single drain or catch-up may take before the
/// scheduler gives up on the context.
pub const STEP_LIMIT: u64 = 1_000_000;

/// Handle to an execution context owned by some component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub usize);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

/// Resumable position of one hardware component.
///
/// The chip's registers live in the component itself; the context only tracks
/// where in emulated time the component currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    id: ThreadId,
    name: &'static str,
    /// Clock rate in Hz
    frequency: u64,
    /// Local cycles executed since the context was (re)created
    clock: u64,
}

impl ExecutionContext {
    pub fn new(id: ThreadId, name: &'static str, frequency: u64) -> Self {
        debug_assert!(frequency > 0, "{name}: zero clock frequency");
        Self {
            id,
            name,
            frequency: frequency.max(1),
            clock: 0,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Account for `cycles` local cycles of completed work.
    pub fn advance(&mut self, cycles: u64) {
        self.clock = self.clock.saturating_add(cycles);
    }

    /// Restore a captured clock value.
    pub fn set_clock(&mut self, clock: u64) {
        self.clock = clock;
    }

    /// Recreate the context at time zero with a (possibly new) clock rate.
    pub fn recreate(&mut self, frequency: u64) {
        debug_assert!(frequency > 0, "{}: zero clock frequency", self.name);
        self.frequency = frequency.max(1);
        self.clock = 0;
    }

    /// Compare absolute emulated time with another context.
    ///
    /// Exact: `clock / frequency` is compared by cross-multiplication.
    pub fn time_cmp(&self, other: &ExecutionContext) -> Ordering {
        let lhs = u128::from(self.clock) * u128::from(other.frequency);
        let rhs = u128::from(other.clock) * u128::from(self.frequency);
        lhs.cmp(&rhs)
    }

    pub fn is_behind(&self, other: &ExecutionContext) -> bool {
        self.time_cmp(other) == Ordering::Less
    }

    /// True once this context is at or past `other` in emulated time.
    pub fn has_reached(&self, other: &ExecutionContext) -> bool {
        !self.is_behind(other)
    }
}

/// How far non-primary contexts may run relative to the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// No cross-context capping.
    #[default]
    None,
    /// The target context is capped to the reference context's position.
    LockToReference,
}

/// Why [`Scheduler::enter`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    /// The video component reached the end-of-frame line.
    FrameEvent,
    /// The locked context reached the reference context.
    SynchronizeEvent,
}

/// Pending exit request, raised by components from inside a step.
#[derive(Debug, Default)]
pub struct ExitLatch {
    pending: Option<ExitReason>,
}

impl ExitLatch {
    /// Request that the current resumption stops after this step.
    ///
    /// The first request wins; returns false if one was already pending.
    pub fn raise(&mut self, reason: ExitReason) -> bool {
        match self.pending {
            Some(existing) => {
                log(LogCategory::Scheduler, LogLevel::Debug, || {
                    format!(
                        "Scheduler: exit {:?} ignored, {:?} already pending",
                        reason, existing
                    )
                });
                false
            }
            None => {
                self.pending = Some(reason);
                true
            }
        }
    }

    pub fn pending(&self) -> Option<ExitReason> {
        self.pending
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn take(&mut self) -> Option<ExitReason> {
        self.pending.take()
    }

    fn clear(&mut self) {
        self.pending = None;
    }
}

/// Set of contexts the scheduler can resume.
///
/// Implemented by whatever owns the components; the scheduler only ever sees
/// thread handles and read-only views of their contexts.
pub trait Machine {
    /// Current position of `thread`, or `None` if no component owns it.
    fn context(&self, thread: ThreadId) -> Option<&ExecutionContext>;

    /// Run exactly one atomic unit of work on `thread`.
    fn step(&mut self, thread: ThreadId, exit: &mut ExitLatch);
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("LockToReference requires a reference context")]
    MissingReference,
    #[error("unknown execution context {0}")]
    UnknownThread(ThreadId),
    #[error("{name} ({thread}) did not reach the reference context within {steps} steps")]
    SyncTimeout {
        thread: ThreadId,
        name: &'static str,
        steps: u64,
    },
    #[error("{name} ({thread}) stopped advancing while catching up ({steps} steps)")]
    Stalled {
        thread: ThreadId,
        name: &'static str,
        steps: u64,
    },
}

/// Cooperative scheduler over a [`Machine`].
#[derive(Debug)]
pub struct Scheduler {
    sync: SyncMode,
    reference: Option<ThreadId>,
    /// Context drained under `LockToReference`
    target: ThreadId,
    primary: ThreadId,
    threads: Vec<ThreadId>,
    exit: ExitLatch,
    reason: Option<ExitReason>,
}

impl Scheduler {
    pub fn new(primary: ThreadId) -> Self {
        Self {
            sync: SyncMode::None,
            reference: None,
            target: primary,
            primary,
            threads: vec![primary],
            exit: ExitLatch::default(),
            reason: None,
        }
    }

    /// Re-associate with the current set of contexts.
    ///
    /// `threads` lists every context to resume, in catch-up order; the
    /// primary is included automatically if missing.
    pub fn init(&mut self, primary: ThreadId, threads: Vec<ThreadId>) {
        let mut threads = threads;
        if !threads.contains(&primary) {
            threads.insert(0, primary);
        }
        let mut seen = HashSet::new();
        threads.retain(|thread| seen.insert(*thread));

        log(LogCategory::Scheduler, LogLevel::Debug, || {
            format!(
                "Scheduler: init primary={} threads={:?}",
                primary,
                threads.iter().map(|t| t.0).collect::<Vec<_>>()
            )
        });

        self.sync = SyncMode::None;
        self.reference = None;
        self.target = primary;
        self.primary = primary;
        self.threads = threads;
        self.exit.clear();
        self.reason = None;
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync
    }

    pub fn reference(&self) -> Option<ThreadId> {
        self.reference
    }

    pub fn target(&self) -> ThreadId {
        self.target
    }

    pub fn primary(&self) -> ThreadId {
        self.primary
    }

    pub fn threads(&self) -> &[ThreadId] {
        &self.threads
    }

    /// Select the synchronization policy.
    ///
    /// Any stale exit reason from the previous mode is discarded. `enter`
    /// holds `&mut self` for the whole resumption, so the mode cannot change
    /// while one is in progress.
    pub fn set_sync_mode(
        &mut self,
        mode: SyncMode,
        reference: Option<ThreadId>,
    ) -> Result<(), SchedulerError> {
        self.reference = match mode {
            SyncMode::None => None,
            SyncMode::LockToReference => Some(reference.ok_or(SchedulerError::MissingReference)?),
        };
        self.sync = mode;
        self.exit.clear();
        self.reason = None;
        Ok(())
    }

    /// Designate the context drained under `LockToReference`.
    pub fn set_target(&mut self, thread: ThreadId) {
        self.target = thread;
    }

    /// Reason recorded by the last `enter()`.
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.reason
    }

    /// Ask the current (or next) resumption to stop at the next step boundary.
    pub fn raise_exit(&mut self, reason: ExitReason) -> bool {
        self.exit.raise(reason)
    }

    /// Resume execution until an exit reason is available.
    pub fn enter<M: Machine + ?Sized>(
        &mut self,
        machine: &mut M,
    ) -> Result<ExitReason, SchedulerError> {
        self.reason = None;
        let result = match self.sync {
            SyncMode::None => self.run_free(machine),
            SyncMode::LockToReference => self.run_locked(machine),
        };

        match result {
            Ok(reason) => {
                self.reason = Some(reason);
                Ok(reason)
            }
            Err(err) => {
                self.exit.clear();
                log(LogCategory::Scheduler, LogLevel::Error, || {
                    format!("Scheduler: {}", err)
                });
                Err(err)
            }
        }
    }

    fn run_free<M: Machine + ?Sized>(&mut self, machine: &mut M) -> Result<ExitReason, SchedulerError> {
        let primary = self.primary;
        Self::context_of(machine, primary)?;

        loop {
            if let Some(reason) = self.exit.take() {
                return Ok(reason);
            }

            machine.step(primary, &mut self.exit);

            for index in 0..self.threads.len() {
                if self.exit.is_pending() {
                    break;
                }
                let thread = self.threads[index];
                if thread != primary {
                    self.catch_up(machine, thread, primary)?;
                }
            }
        }
    }

    fn catch_up<M: Machine + ?Sized>(
        &mut self,
        machine: &mut M,
        thread: ThreadId,
        primary: ThreadId,
    ) -> Result<(), SchedulerError> {
        let mut steps = 0;
        loop {
            let context = Self::context_of(machine, thread)?;
            if !context.is_behind(Self::context_of(machine, primary)?) || self.exit.is_pending() {
                return Ok(());
            }
            if steps == STEP_LIMIT {
                return Err(SchedulerError::Stalled {
                    thread,
                    name: context.name(),
                    steps,
                });
            }
            machine.step(thread, &mut self.exit);
            steps += 1;
        }
    }

    fn run_locked<M: Machine + ?Sized>(&mut self, machine: &mut M) -> Result<ExitReason, SchedulerError> {
        let reference = self.reference.ok_or(SchedulerError::MissingReference)?;
        let target = self.target;
        Self::context_of(machine, reference)?;

        let mut steps = 0;
        loop {
            if let Some(reason) = self.exit.take() {
                return Ok(reason);
            }

            let context = Self::context_of(machine, target)?;
            if target == reference || context.has_reached(Self::context_of(machine, reference)?) {
                log(LogCategory::Scheduler, LogLevel::Trace, || {
                    format!(
                        "Scheduler: {} synchronized after {} steps (clock {})",
                        context.name(),
                        steps,
                        context.clock()
                    )
                });
                return Ok(ExitReason::SynchronizeEvent);
            }
            if steps == STEP_LIMIT {
                return Err(SchedulerError::SyncTimeout {
                    thread: target,
                    name: context.name(),
                    steps,
                });
            }

            machine.step(target, &mut self.exit);
            steps += 1;
        }
    }

    fn context_of<M: Machine + ?Sized>(
        machine: &M,
        thread: ThreadId,
    ) -> Result<&ExecutionContext, SchedulerError> {
        machine
            .context(thread)
            .ok_or(SchedulerError::UnknownThread(thread))
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(ThreadId(0))
    }
}
