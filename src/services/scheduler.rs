//! Single-threaded ticker for the weather and image cycles.
//!
//! Each task runs to completion and returns how long to wait before its next run, so
//! the cadence is "run, then wait", not fixed-rate. The stop flag is checked between
//! runs and while sleeping; a running cycle always finishes.

use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::services::cycle::CycleOutcome;

/// Longest single sleep, so a stop request is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Weather,
    Images,
}

/// The user-visible error banner: one slot per cycle kind, weather shown first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusBanner {
    weather: Option<String>,
    images: Option<String>,
}

impl StatusBanner {
    /// Apply a finished cycle. Returns true when the displayed message changed.
    pub fn apply(&mut self, kind: CycleKind, outcome: &CycleOutcome) -> bool {
        let before = self.message().map(str::to_string);
        let slot = match kind {
            CycleKind::Weather => &mut self.weather,
            CycleKind::Images => &mut self.images,
        };
        *slot = if outcome.is_clean() {
            None
        } else {
            Some(outcome.first_error.clone().unwrap_or_else(|| "cycle failed".to_string()))
        };
        before.as_deref() != self.message()
    }

    pub fn message(&self) -> Option<&str> {
        self.weather.as_deref().or(self.images.as_deref())
    }
}

struct Task<'a> {
    name: &'static str,
    due: Instant,
    run: Box<dyn FnMut() -> Duration + 'a>,
}

pub struct Scheduler<'a> {
    tasks: Vec<Task<'a>>,
    stop: Arc<AtomicBool>,
}

impl<'a> Scheduler<'a> {
    pub fn new(stop: Arc<AtomicBool>) -> Self {
        Scheduler { tasks: Vec::new(), stop }
    }

    /// Register a task, due immediately. `run` returns the delay until its next run.
    pub fn add(&mut self, name: &'static str, run: impl FnMut() -> Duration + 'a) {
        self.tasks.push(Task {
            name,
            due: Instant::now(),
            run: Box::new(run),
        });
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Run every task due at `now`, in registration order. Returns how many ran.
    pub fn tick(&mut self, now: Instant) -> usize {
        let mut ran = 0;
        for i in 0..self.tasks.len() {
            if self.stopped() {
                break;
            }
            if self.tasks[i].due > now {
                continue;
            }
            let task = &mut self.tasks[i];
            let wait = (task.run)();
            task.due = Instant::now() + wait;
            ran += 1;
        }
        ran
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.tasks.iter().map(|t| t.due).min()
    }

    pub fn run(&mut self) {
        info!(
            "Scheduler: starting {} task(s): {}",
            self.tasks.len(),
            self.tasks.iter().map(|t| t.name).collect::<Vec<_>>().join(", ")
        );
        while !self.stopped() {
            self.tick(Instant::now());
            let Some(due) = self.next_due() else {
                warn!("Scheduler: no tasks registered");
                break;
            };
            while !self.stopped() {
                let now = Instant::now();
                if now >= due {
                    break;
                }
                thread::sleep((due - now).min(SLEEP_SLICE));
            }
        }
        info!("Scheduler: stopped");
    }
}
