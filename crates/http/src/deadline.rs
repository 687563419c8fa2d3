//! Per-connection idle deadline.
//!
//! Every connection owns one [`DeadlineSupervisor`]. Successful reads, writes and
//! handshakes push the deadline one idle window forward. The connection races each
//! pending operation against [`DeadlineSupervisor::expired`]; when that wins, it asks
//! [`DeadlineSupervisor::tick`] what the expiry means:
//!
//! ```text
//!   Armed ──tick, before deadline──▶ Armed          (Rearm)
//!   Armed ──tick, past deadline───▶ ShuttingDown    (Timeout, reported once)
//!   ShuttingDown ──tick, past the shutdown window──▶ (ShutdownExpired)
//!   ShuttingDown ──finish()──▶ Closed
//! ```
//!
//! Entering shutdown re-arms a fresh window, so a close sequence the peer never
//! answers is bounded by the same idle window as normal traffic.

use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// Default idle window for reads, writes, handshakes and shutdown.
pub const IDLE_WINDOW: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Armed,
    ShuttingDown,
    Closed,
}

/// What a wake-up of the supervisor means for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The deadline moved since the wait began; wait again.
    Rearm,
    /// The idle window elapsed. Reported once per connection.
    Timeout,
    /// The shutdown sequence outlived its own window; release the connection.
    ShutdownExpired,
    /// Nothing to supervise: the deadline is suspended or the connection closed.
    Idle,
}

#[derive(Debug)]
pub struct DeadlineSupervisor {
    window: Duration,
    /// `None` is the infinite deadline.
    deadline: Option<Instant>,
    phase: Phase,
    half_closed: bool,
}

impl DeadlineSupervisor {
    /// Creates a supervisor armed one window from now.
    pub fn new(window: Duration) -> Self {
        Self { window, deadline: Some(Instant::now() + window), phase: Phase::Armed, half_closed: false }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_half_closed(&self) -> bool {
        self.half_closed
    }

    /// Pushes the deadline a full window past now. Once shutdown has begun only the
    /// shutdown window applies, so traffic no longer extends it.
    pub fn refresh(&mut self) {
        if self.phase == Phase::Armed {
            self.deadline = Some(Instant::now() + self.window);
        }
    }

    /// Moves the deadline to infinity.
    pub fn suspend(&mut self) {
        self.deadline = None;
    }

    /// Resolves once the current deadline passes; never resolves while suspended.
    ///
    /// The returned future does not borrow the supervisor, so it can be raced against
    /// an operation that refreshes it.
    pub fn expired(&self) -> impl Future<Output = ()> + Send + 'static {
        let deadline = self.deadline;
        async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        }
    }

    pub fn tick(&mut self, now: Instant) -> Tick {
        let deadline = match (self.phase, self.deadline) {
            (Phase::Closed, _) | (_, None) => return Tick::Idle,
            (_, Some(deadline)) => deadline,
        };

        if now < deadline {
            return Tick::Rearm;
        }

        match self.phase {
            Phase::Armed => {
                self.phase = Phase::ShuttingDown;
                Tick::Timeout
            }
            Phase::ShuttingDown => Tick::ShutdownExpired,
            Phase::Closed => Tick::Idle,
        }
    }

    /// Guards entry into the shutdown sequence.
    ///
    /// The first call suspends the deadline, re-arms it with a fresh window for the
    /// shutdown itself, marks the connection half-closed and returns `true`. Every
    /// later call returns `false` and changes nothing, so the close operation is
    /// issued at most once.
    pub fn begin_shutdown(&mut self) -> bool {
        if self.half_closed || self.phase == Phase::Closed {
            return false;
        }

        self.suspend();
        self.phase = Phase::ShuttingDown;
        self.deadline = Some(Instant::now() + self.window);
        self.half_closed = true;
        true
    }

    /// The shutdown finished, whatever its outcome.
    pub fn finish(&mut self) {
        self.phase = Phase::Closed;
        self.deadline = None;
    }
}

impl Default for DeadlineSupervisor {
    fn default() -> Self {
        Self::new(IDLE_WINDOW)
    }
}
