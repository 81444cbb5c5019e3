use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use jobline_core::config::SchedulerConfig;
use jobline_core::{JobDefinition, JobKey, JobStatus, MisfirePolicy};
use jobline_invoke::{InvokeError, Resolved};
use tokio::sync::{oneshot, watch, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SchedulerError};
use crate::execution::Executor;
use crate::schedule::{self, next_fire_after, parse_cron};
use crate::types::{ExecutionResult, JobInfo, ShutdownMode, Trigger};

/// Upper bound on missed fire times counted for one job in one tick.
const MAX_COUNTED_MISSES: usize = 10_000;

/// Catch-up owed to a non-concurrent job whose fire times arrived while busy.
#[derive(Debug, Clone, Copy)]
struct Deferred {
    missed: u32,
    /// Start as soon as the job goes idle; otherwise wait for the next tick.
    on_completion: bool,
}

struct JobSlot {
    definition: JobDefinition,
    schedule: cron::Schedule,
    next_fire: Option<DateTime<Utc>>,
    last_fired: Option<DateTime<Utc>>,
    /// Distinguishes this registration from an earlier one under the same key.
    generation: u64,
    /// Firings issued and not yet finished.
    in_flight: usize,
    deferred: Option<Deferred>,
    /// Held by the running firing of a non-concurrent job; FIFO.
    serial: Arc<tokio::sync::Mutex<()>>,
}

impl JobSlot {
    fn info(&self) -> JobInfo {
        JobInfo {
            definition: self.definition.clone(),
            next_fire: self.next_fire,
            last_fired: self.last_fired,
            in_flight: self.in_flight,
        }
    }

    fn is_paused(&self) -> bool {
        self.definition.status == JobStatus::Paused
    }

    fn is_busy(&self) -> bool {
        !self.definition.concurrent && self.in_flight > 0
    }
}

struct Shared {
    config: SchedulerConfig,
    executor: Executor,
    table: Mutex<HashMap<JobKey, JobSlot>>,
    pool: Arc<Semaphore>,
    tracker: TaskTracker,
    abort: CancellationToken,
    stopping: AtomicBool,
    generations: AtomicU64,
}

/// Resolves to the [`ExecutionResult`] of a firing issued by
/// [`Scheduler::trigger_now`].
#[derive(Debug)]
pub struct FiringHandle {
    rx: oneshot::Receiver<Result<ExecutionResult>>,
}

impl FiringHandle {
    /// Wait for the firing to finish.
    ///
    /// Fails with [`SchedulerError::ShuttingDown`] when a forced shutdown
    /// dropped the firing before it started running, and with
    /// [`SchedulerError::JobNotFound`] when the job was deleted meanwhile.
    pub async fn wait(self) -> Result<ExecutionResult> {
        self.rx.await.unwrap_or(Err(SchedulerError::ShuttingDown))
    }
}

/// Owns the job table and fires jobs on their cron schedules.
///
/// Cheap to clone; every clone drives the same scheduler. Lifecycle calls
/// are serialized on one table lock, so they are atomic with respect to
/// each other.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, executor: Executor) -> Self {
        let pool = Arc::new(Semaphore::new(config.pool_size.max(1)));
        Self {
            shared: Arc::new(Shared {
                config,
                executor,
                table: Mutex::new(HashMap::new()),
                pool,
                tracker: TaskTracker::new(),
                abort: CancellationToken::new(),
                stopping: AtomicBool::new(false),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Register a new job. The first fire time is computed from now.
    pub fn add_job(&self, definition: JobDefinition) -> Result<()> {
        let schedule = parse_cron(&definition.cron)?;
        let key = definition.key();

        let mut table = self.shared.table.lock().unwrap();
        if table.contains_key(&key) {
            return Err(SchedulerError::DuplicateJob {
                key: key.to_string(),
            });
        }
        if let Err(e) = self.check_target(&definition.target) {
            warn!(job = %key, target = %definition.target, "job target does not resolve yet: {e}");
        }

        let next_fire = next_fire_after(&schedule, Utc::now());
        info!(job = %key, cron = %definition.cron, status = %definition.status, next_fire = ?next_fire, "job added");
        table.insert(
            key,
            JobSlot {
                definition,
                schedule,
                next_fire,
                last_fired: None,
                generation: self.shared.generations.fetch_add(1, Ordering::Relaxed),
                in_flight: 0,
                deferred: None,
                serial: Arc::new(tokio::sync::Mutex::new(())),
            },
        );
        Ok(())
    }

    /// Replace the definition registered under `definition.key()`.
    ///
    /// The cron text is validated first, so a failed update leaves the old
    /// job untouched. Firings already issued finish under the old
    /// definition; the job still never overlaps itself when non-concurrent.
    pub fn update_job(&self, definition: JobDefinition) -> Result<()> {
        let schedule = parse_cron(&definition.cron)?;
        let key = definition.key();

        let mut table = self.shared.table.lock().unwrap();
        let slot = table
            .get_mut(&key)
            .ok_or_else(|| SchedulerError::JobNotFound {
                key: key.to_string(),
            })?;

        slot.next_fire = next_fire_after(&schedule, Utc::now());
        slot.schedule = schedule;
        slot.definition = definition;
        slot.deferred = None;
        info!(job = %key, cron = %slot.definition.cron, next_fire = ?slot.next_fire, "job updated");
        Ok(())
    }

    /// Remove the job. Firings already issued still run to completion.
    pub fn delete_job(&self, key: &JobKey) -> Result<()> {
        let mut table = self.shared.table.lock().unwrap();
        if table.remove(key).is_none() {
            return Err(SchedulerError::JobNotFound {
                key: key.to_string(),
            });
        }
        info!(job = %key, "job deleted");
        Ok(())
    }

    pub fn pause_job(&self, key: &JobKey) -> Result<()> {
        self.set_status(key, JobStatus::Paused)
    }

    /// Resume on the original schedule. Fire times that elapsed while paused
    /// are handled by the job's misfire policy on the next tick.
    pub fn resume_job(&self, key: &JobKey) -> Result<()> {
        self.set_status(key, JobStatus::Normal)
    }

    fn set_status(&self, key: &JobKey, status: JobStatus) -> Result<()> {
        let mut table = self.shared.table.lock().unwrap();
        let slot = table
            .get_mut(key)
            .ok_or_else(|| SchedulerError::JobNotFound {
                key: key.to_string(),
            })?;
        slot.definition.status = status;
        slot.deferred = None;
        info!(job = %key, %status, "job status changed");
        Ok(())
    }

    /// Fire the job once, now, regardless of its schedule or pause state.
    ///
    /// A non-concurrent job that is already running gets this firing queued
    /// behind the running one.
    pub fn trigger_now(&self, key: &JobKey) -> Result<FiringHandle> {
        if self.shared.stopping.load(Ordering::SeqCst) {
            return Err(SchedulerError::ShuttingDown);
        }
        let mut table = self.shared.table.lock().unwrap();
        let slot = table
            .get_mut(key)
            .ok_or_else(|| SchedulerError::JobNotFound {
                key: key.to_string(),
            })?;
        info!(job = %key, "job triggered manually");
        let rx = self.issue(key, slot, Trigger::Manual, Utc::now());
        Ok(FiringHandle { rx })
    }

    pub fn get_job(&self, key: &JobKey) -> Result<JobInfo> {
        let table = self.shared.table.lock().unwrap();
        table
            .get(key)
            .map(JobSlot::info)
            .ok_or_else(|| SchedulerError::JobNotFound {
                key: key.to_string(),
            })
    }

    /// Every registered job, ordered by group then name.
    pub fn list_jobs(&self) -> Vec<JobInfo> {
        let table = self.shared.table.lock().unwrap();
        let mut jobs: Vec<JobInfo> = table.values().map(JobSlot::info).collect();
        jobs.sort_by(|a, b| a.definition.key().cmp(&b.definition.key()));
        jobs
    }

    /// Parse and resolve `target` against the registry without invoking it.
    pub fn check_target(&self, target: &str) -> std::result::Result<Resolved, InvokeError> {
        self.shared.executor.invoker().check(target)
    }

    pub fn validate_cron_expression(expression: &str) -> bool {
        schedule::validate_cron_expression(expression)
    }

    pub fn next_fire_time(expression: &str) -> Option<DateTime<Utc>> {
        schedule::next_fire_time(expression)
    }

    /// Evaluate every job against `now` and issue the firings that are due.
    /// Returns the number of firings issued.
    pub fn tick(&self, now: DateTime<Utc>) -> usize {
        if self.shared.stopping.load(Ordering::SeqCst) {
            return 0;
        }
        let threshold = chrono::Duration::seconds(self.shared.config.misfire_threshold_secs as i64);
        let mut issued = 0;

        let mut table = self.shared.table.lock().unwrap();
        for (key, slot) in table.iter_mut() {
            if slot.is_paused() {
                continue;
            }
            let Some(first_due) = slot.next_fire.filter(|at| *at <= now) else {
                // Nothing due; a coalesced catch-up may be waiting for this job to go idle.
                if let Some(deferred) = slot.deferred.filter(|d| !d.on_completion) {
                    if !slot.is_busy() {
                        slot.deferred = None;
                        debug!(job = %key, missed = deferred.missed, "issuing coalesced catch-up");
                        self.issue(key, slot, Trigger::CatchUp { missed: deferred.missed }, now);
                        issued += 1;
                    }
                }
                continue;
            };

            let mut last_due = first_due;
            let mut due = 1usize;
            for at in slot.schedule.after(&first_due).take(MAX_COUNTED_MISSES) {
                if at > now {
                    break;
                }
                last_due = at;
                due += 1;
            }
            let due = u32::try_from(due).unwrap_or(u32::MAX);
            slot.next_fire = next_fire_after(&slot.schedule, now);

            let policy = slot.definition.misfire;
            if slot.is_busy() {
                self.defer(key, slot, due);
                continue;
            }
            slot.deferred = None;

            let trigger = if now - first_due > threshold {
                if policy == MisfirePolicy::Skip {
                    info!(job = %key, missed = due, next_fire = ?slot.next_fire, "misfire: skipped");
                    continue;
                }
                info!(job = %key, missed = due, %policy, "misfire: firing catch-up");
                Trigger::Misfire {
                    scheduled_at: first_due,
                    missed: due,
                }
            } else {
                if due > 1 {
                    debug!(job = %key, coalesced = due, "several fire times due at once");
                }
                Trigger::Scheduled { at: last_due }
            };
            self.issue(key, slot, trigger, now);
            issued += 1;
        }
        issued
    }

    /// Fire times arrived while the job's previous firing is still in flight.
    fn defer(&self, key: &JobKey, slot: &mut JobSlot, due: u32) {
        let on_completion = match slot.definition.misfire {
            MisfirePolicy::Skip => {
                debug!(job = %key, missed = due, "job busy: fire skipped");
                return;
            }
            MisfirePolicy::FireNow => true,
            MisfirePolicy::FireOnce => false,
        };
        let missed = slot
            .deferred
            .map_or(due, |d| d.missed.saturating_add(due));
        debug!(job = %key, missed, "job busy: catch-up deferred");
        slot.deferred = Some(Deferred {
            missed,
            on_completion,
        });
    }

    /// Spawn one firing of `slot`. Must be called with the table lock held.
    fn issue(
        &self,
        key: &JobKey,
        slot: &mut JobSlot,
        trigger: Trigger,
        now: DateTime<Utc>,
    ) -> oneshot::Receiver<Result<ExecutionResult>> {
        let (tx, rx) = oneshot::channel();
        slot.in_flight += 1;
        slot.last_fired = Some(now);

        let scheduler = self.clone();
        let key = key.clone();
        let target = slot.definition.target.clone();
        let serial = (!slot.definition.concurrent).then(|| Arc::clone(&slot.serial));
        let generation = slot.generation;

        self.shared.tracker.spawn(async move {
            let shared = &scheduler.shared;
            let ready = async move {
                let guard = match serial {
                    Some(serial) => Some(serial.lock_owned().await),
                    None => None,
                };
                let permit = Arc::clone(&shared.pool).acquire_owned().await;
                (guard, permit)
            };
            let acquired = tokio::select! {
                biased;
                _ = shared.abort.cancelled() => None,
                acquired = ready => Some(acquired),
            };

            match acquired {
                Some((guard, Ok(permit))) => {
                    if let Err(reason) = scheduler.admit(&key, generation, &trigger) {
                        debug!(job = %key, trigger = trigger.kind(), "pending firing dropped: {reason}");
                        drop(permit);
                        drop(guard);
                        scheduler.finish(&key, generation);
                        let _ = tx.send(Err(reason));
                        return;
                    }
                    let result = shared
                        .executor
                        .execute(&key, &target, trigger, &shared.abort)
                        .await;
                    drop(permit);
                    drop(guard);
                    scheduler.finish(&key, generation);
                    let _ = tx.send(Ok(result));
                }
                Some((_, Err(e))) => {
                    error!(job = %key, "worker pool unavailable: {e}");
                    scheduler.finish(&key, generation);
                }
                None => {
                    debug!(job = %key, "pending firing dropped by forced shutdown");
                    scheduler.finish(&key, generation);
                }
            }
        });
        rx
    }

    /// A pending firing may only start if its registration still exists and,
    /// unless it was requested manually, the job is not paused.
    fn admit(&self, key: &JobKey, generation: u64, trigger: &Trigger) -> Result<()> {
        let table = self.shared.table.lock().unwrap();
        match table.get(key).filter(|s| s.generation == generation) {
            None => Err(SchedulerError::JobNotFound {
                key: key.to_string(),
            }),
            Some(slot) if slot.is_paused() && *trigger != Trigger::Manual => {
                Err(SchedulerError::JobPaused {
                    key: key.to_string(),
                })
            }
            Some(_) => Ok(()),
        }
    }

    /// Bookkeeping after a firing ends; starts a fire-now catch-up owed to the job.
    fn finish(&self, key: &JobKey, generation: u64) {
        let mut table = self.shared.table.lock().unwrap();
        let Some(slot) = table.get_mut(key).filter(|s| s.generation == generation) else {
            return;
        };
        slot.in_flight = slot.in_flight.saturating_sub(1);

        if slot.is_busy() || slot.is_paused() || self.shared.stopping.load(Ordering::SeqCst) {
            return;
        }
        if let Some(deferred) = slot.deferred.filter(|d| d.on_completion) {
            slot.deferred = None;
            debug!(job = %key, missed = deferred.missed, "issuing catch-up after completion");
            self.issue(key, slot, Trigger::CatchUp { missed: deferred.missed }, Utc::now());
        }
    }

    /// Drive [`Scheduler::tick`] on the configured interval until `shutdown`
    /// broadcasts `true`. Does not stop in-flight firings; see [`Scheduler::shutdown`].
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_millis(self.shared.config.tick_interval_ms.max(1));
        info!(
            tick_ms = period.as_millis() as u64,
            pool_size = self.shared.config.pool_size,
            "scheduler started"
        );

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let fired = self.tick(Utc::now());
                    if fired > 0 {
                        debug!(fired, "scheduler tick");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler loop stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Stop issuing firings and wait until every issued firing has finished.
    ///
    /// `Graceful` lets them all run; `Forced` interrupts running job bodies
    /// (reported with stage `aborted`) and drops firings that had not started.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared.tracker.close();
        let in_flight = self.shared.tracker.len();
        info!(?mode, in_flight, "scheduler shutting down");

        if mode == ShutdownMode::Forced {
            self.shared.abort.cancel();
        }
        self.shared.tracker.wait().await;
        info!("scheduler stopped");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.stopping.load(Ordering::SeqCst)
    }
}
