//! Cooperative job scheduler driven by a single runner thread.
//!
//! Jobs are plain closures. `tick` runs every job whose due time has passed,
//! in registration order, then sleeps one quantum. A failing job is logged
//! and keeps its schedule.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_core::RelayError;
use tracing::{debug, error};

use crate::clock::Clock;

pub type JobFn = Box<dyn FnMut() -> Result<(), RelayError> + Send>;

struct Job {
    name: String,
    every: Duration,
    once: bool,
    fired: bool,
    next_due: Instant,
    run: JobFn,
}

/// Registration side of the scheduler. Cheap to clone and safe to use from
/// inside a running job: registrations are queued and adopted at the start
/// of the next tick.
#[derive(Clone)]
pub struct SchedulerHandle {
    queued: Arc<Mutex<Vec<Job>>>,
    clock: Arc<dyn Clock>,
}

impl SchedulerHandle {
    /// First run is one interval after registration.
    pub fn schedule_interval<F>(&self, name: &str, every: Duration, job: F)
    where
        F: FnMut() -> Result<(), RelayError> + Send + 'static,
    {
        self.push(name, every, false, Box::new(job));
    }

    /// Runs once, `after` from now, then unregisters itself.
    pub fn schedule_once<F>(&self, name: &str, after: Duration, job: F)
    where
        F: FnOnce() -> Result<(), RelayError> + Send + 'static,
    {
        let mut job = Some(job);
        self.push(
            name,
            after,
            true,
            Box::new(move || match job.take() {
                Some(f) => f(),
                None => Ok(()),
            }),
        );
    }

    fn push(&self, name: &str, every: Duration, once: bool, run: JobFn) {
        let next_due = self.clock.now() + every;
        self.queued.lock().push(Job { name: name.to_string(), every, once, fired: false, next_due, run });
    }
}

pub struct Scheduler {
    jobs: Mutex<Vec<Job>>,
    handle: SchedulerHandle,
    quantum: Duration,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>, quantum: Duration) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            handle: SchedulerHandle { queued: Arc::new(Mutex::new(Vec::new())), clock },
            quantum,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub fn schedule_interval<F>(&self, name: &str, every: Duration, job: F)
    where
        F: FnMut() -> Result<(), RelayError> + Send + 'static,
    {
        self.handle.schedule_interval(name, every, job)
    }

    pub fn schedule_once<F>(&self, name: &str, after: Duration, job: F)
    where
        F: FnOnce() -> Result<(), RelayError> + Send + 'static,
    {
        self.handle.schedule_once(name, after, job)
    }

    /// Runs due jobs, then blocks for the base quantum.
    pub fn tick(&self) {
        self.run_pending();
        self.handle.clock.sleep(self.quantum);
    }

    /// Runs every due job once; returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut jobs = self.jobs.lock();
        jobs.append(&mut self.handle.queued.lock());

        let now = self.handle.clock.now();
        let mut ran = 0;
        for job in jobs.iter_mut().filter(|j| now >= j.next_due) {
            debug!("running job {}", job.name);
            if let Err(e) = (job.run)() {
                error!("job {} failed: {e}", job.name);
            }
            job.next_due = now + job.every;
            job.fired = true;
            ran += 1;
        }
        jobs.retain(|j| !(j.once && j.fired));
        ran
    }

    /// Drops every registered and queued job. Safe to call repeatedly.
    pub fn clear(&self) {
        self.jobs.lock().clear();
        self.handle.queued.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len() + self.handle.queued.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() -> Result<(), RelayError> + Send + 'static) {
        let n = Arc::new(AtomicUsize::new(0));
        let c = n.clone();
        (n, move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn scheduler() -> (Arc<ManualClock>, Scheduler) {
        let clock = Arc::new(ManualClock::new());
        let s = Scheduler::new(clock.clone(), Duration::from_secs(1));
        (clock, s)
    }

    #[test]
    fn interval_jobs_fire_on_their_cadence() {
        let (_clock, s) = scheduler();
        let (fast, f) = counter();
        let (slow, g) = counter();
        s.schedule_interval("fast", Duration::from_secs(2), f);
        s.schedule_interval("slow", Duration::from_secs(5), g);
        // ticks at t = 0..=10
        for _ in 0..=10 {
            s.tick();
        }
        assert_eq!(fast.load(Ordering::SeqCst), 5);
        assert_eq!(slow.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn due_jobs_run_in_registration_order() {
        let (_clock, s) = scheduler();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let o = order.clone();
            s.schedule_interval(name, Duration::from_secs(1), move || {
                o.lock().push(name);
                Ok(())
            });
        }
        s.tick();
        s.tick();
        assert_eq!(order.lock().as_slice(), &["a", "b", "c"]);
    }

    #[test]
    fn failing_job_keeps_its_schedule() {
        let (_clock, s) = scheduler();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        s.schedule_interval("flaky", Duration::from_secs(1), move || {
            c.fetch_add(1, Ordering::SeqCst);
            Err(RelayError::Msg("boom".into()))
        });
        for _ in 0..4 {
            s.tick();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn one_shot_runs_once_and_unregisters() {
        let (_clock, s) = scheduler();
        let (n, mut f) = counter();
        s.schedule_once("later", Duration::from_secs(3), move || f());
        for _ in 0..10 {
            s.tick();
        }
        assert_eq!(n.load(Ordering::SeqCst), 1);
        assert!(s.is_empty());
    }

    #[test]
    fn jobs_can_register_jobs() {
        let (_clock, s) = scheduler();
        let (n, f) = counter();
        let handle = s.handle();
        let mut f = Some(f);
        s.schedule_interval("spawner", Duration::from_secs(1), move || {
            if let Some(mut f) = f.take() {
                handle.schedule_once("child", Duration::from_secs(1), move || f());
            }
            Ok(())
        });
        for _ in 0..5 {
            s.tick();
        }
        assert_eq!(n.load(Ordering::SeqCst), 1);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn clear_is_idempotent() {
        let (_clock, s) = scheduler();
        let (n, f) = counter();
        s.schedule_interval("x", Duration::from_secs(1), f);
        s.clear();
        s.clear();
        for _ in 0..3 {
            s.tick();
        }
        assert_eq!(n.load(Ordering::SeqCst), 0);
        assert!(s.is_empty());
    }
}
