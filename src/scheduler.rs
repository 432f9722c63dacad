//! Build scheduling under file-system events.
//!
//! Three flags drive the state machine:
//!
//! | Flag | Set by | Cleared by |
//! |---|---|---|
//! | `needs_build` | a file event | starting a build |
//! | `building` | starting a build | finishing it |
//! | `ready` | the watcher's initial scan | never |
//!
//! A build starts only when `needs_build && !building && ready`. Starting
//! clears `needs_build` *before* the build runs, so events that arrive during
//! the build set it again and are not lost. Finishing immediately tries to
//! start again, which turns any number of events received during one build
//! into exactly one follow-up build.
//!
//! The scheduler holds no I/O; each transition returns whether the caller
//! should start a build now.

/// Coalescing build scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scheduler {
    needs_build: bool,
    building: bool,
    ready: bool,
}

/// Coarse view of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Pending,
    Running,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A file was added, changed or removed.
    pub fn queue_build(&mut self) -> bool {
        self.needs_build = true;
        self.try_start()
    }

    /// The watcher finished its initial scan.
    pub fn mark_ready(&mut self) -> bool {
        self.ready = true;
        self.try_start()
    }

    /// The running build completed, with or without per-node failures.
    pub fn finish(&mut self) -> bool {
        self.building = false;
        self.try_start()
    }

    fn try_start(&mut self) -> bool {
        if self.needs_build && !self.building && self.ready {
            self.needs_build = false;
            self.building = true;
            true
        } else {
            false
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.building {
            SchedulerState::Running
        } else if self.needs_build {
            SchedulerState::Pending
        } else {
            SchedulerState::Idle
        }
    }

    pub fn is_building(&self) -> bool {
        self.building
    }
}
