//! Animation scheduler: periodic driver for an effect machine.
//!
//! The scheduler owns the machine behind a shared lock and runs a tokio timer
//! task that ticks it every `speed` milliseconds. Two notification paths are
//! kept apart:
//!
//! - frame subscribers are called after every successful tick with the new
//!   LED buffer (cheap, per-frame)
//! - a `watch` channel carries the machine status and only changes on
//!   start/pause/resume/stop (coarse, drives panel redraws)
//!
//! Pausing, stopping, changing speed and dropping the scheduler all cancel the
//! pending timer before returning. Every timer carries the generation it was
//! spawned for, so a stale timer that wakes after cancellation exits without
//! touching the machine.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::effect::{EffectError, EffectMachine, LedBuffer, MachineStatus};

/// What the scheduler does when a tick hook fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TickErrorPolicy {
    /// Cancel the timer, pause the machine and record the error
    #[default]
    Halt,
    /// Log the error, drop the frame and keep ticking
    SkipFrame,
    /// Forward the error on the channel from [`Scheduler::take_errors`] and keep ticking
    Propagate,
}

impl std::str::FromStr for TickErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "halt" => Ok(Self::Halt),
            "skip-frame" | "skip" => Ok(Self::SkipFrame),
            "propagate" => Ok(Self::Propagate),
            other => Err(format!("unknown tick error policy: {other}")),
        }
    }
}

/// Handle returned by [`Scheduler::subscribe_frames`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Per-frame callback. Runs on the timer task with the scheduler locked, so it
/// must not call back into the scheduler.
pub type FrameCallback = Box<dyn FnMut(&[u8]) + Send>;

struct Shared {
    machine: EffectMachine,
    subscribers: Vec<(SubscriptionId, FrameCallback)>,
    next_subscription: u64,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    policy: TickErrorPolicy,
    last_error: Option<EffectError>,
    errors: Option<mpsc::UnboundedSender<EffectError>>,
    status_tx: watch::Sender<MachineStatus>,
}

impl Shared {
    fn cancel_timer(&mut self) {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn notify_status(&self) {
        self.status_tx.send_replace(self.machine.status());
    }

    fn fan_out(&mut self) {
        let leds = self.machine.leds().as_bytes();
        for (_, callback) in &mut self.subscribers {
            callback(leds);
        }
    }

    /// Run one tick. Returns false when the timer should stop.
    fn run_tick(&mut self) -> bool {
        match self.machine.tick() {
            Ok(true) => {
                self.fan_out();
                true
            }
            Ok(false) => false,
            Err(e) => self.on_tick_error(e),
        }
    }

    fn on_tick_error(&mut self, e: EffectError) -> bool {
        let effect_id = self.machine.effect_id().to_string();
        match self.policy {
            TickErrorPolicy::Halt => {
                warn!(%effect_id, error = %e, "tick failed, halting");
                self.generation += 1;
                self.timer = None;
                self.machine.pause();
                self.last_error = Some(e);
                self.notify_status();
                false
            }
            TickErrorPolicy::SkipFrame => {
                warn!(%effect_id, error = %e, "tick failed, skipping frame");
                self.last_error = Some(e);
                true
            }
            TickErrorPolicy::Propagate => {
                debug!(%effect_id, error = %e, "tick failed, propagating");
                if let Some(tx) = &self.errors {
                    if tx.send(e.clone()).is_err() {
                        self.errors = None;
                    }
                }
                self.last_error = Some(e);
                true
            }
        }
    }
}

/// Periodic driver for one effect machine
pub struct Scheduler {
    shared: Arc<Mutex<Shared>>,
}

impl Scheduler {
    /// Wrap a machine. Timers are spawned on the current tokio runtime, so
    /// `start`/`resume`/`set_speed` must be called from within one.
    pub fn new(machine: EffectMachine) -> Self {
        Self::with_policy(machine, TickErrorPolicy::default())
    }

    pub fn with_policy(machine: EffectMachine, policy: TickErrorPolicy) -> Self {
        let (status_tx, _) = watch::channel(machine.status());
        Self {
            shared: Arc::new(Mutex::new(Shared {
                machine,
                subscribers: Vec::new(),
                next_subscription: 0,
                generation: 0,
                timer: None,
                policy,
                last_error: None,
                errors: None,
                status_tx,
            })),
        }
    }

    fn spawn_timer(weak: Weak<Mutex<Shared>>, shared: &mut Shared) {
        shared.cancel_timer();
        let generation = shared.generation;
        let period = Duration::from_millis(shared.machine.speed());
        debug!(speed_ms = shared.machine.speed(), generation, "timer scheduled");

        shared.timer = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let mut guard = shared.lock();
                if guard.generation != generation || !guard.run_tick() {
                    break;
                }
            }
        }));
    }

    /// idle -> running, starting the timer
    pub fn start(&self) -> bool {
        let mut guard = self.shared.lock();
        if !guard.machine.start() {
            return false;
        }
        guard.last_error = None;
        Self::spawn_timer(Arc::downgrade(&self.shared), &mut guard);
        guard.notify_status();
        true
    }

    /// running -> paused, cancelling the timer
    pub fn pause(&self) -> bool {
        let mut guard = self.shared.lock();
        if !guard.machine.pause() {
            return false;
        }
        guard.cancel_timer();
        guard.notify_status();
        true
    }

    /// paused -> running, recreating the timer
    pub fn resume(&self) -> bool {
        let mut guard = self.shared.lock();
        if !guard.machine.resume() {
            return false;
        }
        guard.last_error = None;
        Self::spawn_timer(Arc::downgrade(&self.shared), &mut guard);
        guard.notify_status();
        true
    }

    /// Pause when running, resume when paused
    pub fn toggle_pause(&self) -> bool {
        match self.status() {
            MachineStatus::Running => self.pause(),
            MachineStatus::Paused => self.resume(),
            MachineStatus::Idle => false,
        }
    }

    /// Cancel the timer and return the machine to idle with a zeroed buffer
    pub fn stop(&self) -> Result<(), EffectError> {
        let mut guard = self.shared.lock();
        guard.cancel_timer();
        let result = guard.machine.stop();
        guard.notify_status();
        result
    }

    /// Change the tick interval; a running timer is cancelled and rescheduled
    pub fn set_speed(&self, ms: u64) {
        let mut guard = self.shared.lock();
        guard.machine.set_speed(ms);
        if guard.machine.status() == MachineStatus::Running {
            Self::spawn_timer(Arc::downgrade(&self.shared), &mut guard);
        }
    }

    /// Forward a config update to the machine, rescheduling on speed changes
    pub fn set_config(&self, key: &str, value: &Value) -> Result<(), EffectError> {
        let mut guard = self.shared.lock();
        let before = guard.machine.speed();
        guard.machine.set_config(key, value)?;
        if guard.machine.speed() != before && guard.machine.status() == MachineStatus::Running {
            Self::spawn_timer(Arc::downgrade(&self.shared), &mut guard);
        }
        Ok(())
    }

    /// Register a per-frame callback
    pub fn subscribe_frames<F>(&self, callback: F) -> SubscriptionId
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let mut guard = self.shared.lock();
        let id = SubscriptionId(guard.next_subscription);
        guard.next_subscription += 1;
        guard.subscribers.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut guard = self.shared.lock();
        let before = guard.subscribers.len();
        guard.subscribers.retain(|(sub, _)| *sub != id);
        guard.subscribers.len() != before
    }

    /// Status notifications (start/pause/resume/stop only)
    pub fn watch_status(&self) -> watch::Receiver<MachineStatus> {
        self.shared.lock().status_tx.subscribe()
    }

    /// Channel receiving tick errors under [`TickErrorPolicy::Propagate`].
    /// Replaces any previously taken channel.
    pub fn take_errors(&self) -> mpsc::UnboundedReceiver<EffectError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.lock().errors = Some(tx);
        rx
    }

    pub fn policy(&self) -> TickErrorPolicy {
        self.shared.lock().policy
    }

    pub fn set_policy(&self, policy: TickErrorPolicy) {
        self.shared.lock().policy = policy;
    }

    pub fn status(&self) -> MachineStatus {
        self.shared.lock().machine.status()
    }

    pub fn speed(&self) -> u64 {
        self.shared.lock().machine.speed()
    }

    pub fn led_count(&self) -> usize {
        self.shared.lock().machine.led_count()
    }

    /// Snapshot of the current LED buffer
    pub fn leds(&self) -> LedBuffer {
        self.shared.lock().machine.leds().clone()
    }

    /// Most recent tick error, cleared on start/resume
    pub fn last_error(&self) -> Option<EffectError> {
        self.shared.lock().last_error.clone()
    }

    pub fn is_timer_active(&self) -> bool {
        self.shared.lock().timer.is_some()
    }

    /// Read-only access to the machine
    pub fn with_machine<R>(&self, f: impl FnOnce(&EffectMachine) -> R) -> R {
        f(&self.shared.lock().machine)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shared.lock().cancel_timer();
    }
}
