#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jobline_core::config::SchedulerConfig;
use jobline_core::{JobDefinition, JobKey};
use jobline_invoke::{context, job_log, ArgType, Component, ComponentRegistry, Invoker};
use jobline_scheduler::{Executor, LogSink, MemorySink, Scheduler};
use tokio::sync::Semaphore;

pub const HOURLY: &str = "0 0 * * * ?";
pub const WAIT: Duration = Duration::from_secs(5);

/// Job bodies the scheduler tests drive.
pub struct Bench {
    /// `Bench.Wait` blocks until a permit is added here.
    pub gate: Semaphore,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub calls: AtomicUsize,
}

impl Default for Bench {
    fn default() -> Self {
        Self {
            gate: Semaphore::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

impl Bench {
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn wait(self: Arc<Self>) -> anyhow::Result<()> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        job_log!("waiting at the gate");
        self.gate.acquire().await?.forget();
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        job_log!("through the gate");
        Ok(())
    }

    async fn talk(self: Arc<Self>, name: String, lines: i32) -> anyhow::Result<()> {
        for i in 0..lines {
            job_log!("{name} line {i}");
            if i % 7 == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            } else {
                tokio::task::yield_now().await;
            }
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fanout(self: Arc<Self>, name: String) -> anyhow::Result<()> {
        let child = context::spawn(async move {
            tokio::task::yield_now().await;
            job_log!("{name} child task");
            name
        });
        let name = child.await?;
        let blocking = {
            let name = name.clone();
            context::spawn_blocking(move || job_log!("{name} blocking task"))
        };
        blocking.await?;
        job_log!("{name} parent");
        Ok(())
    }
}

pub fn registry(bench: &Arc<Bench>) -> ComponentRegistry {
    let registry = ComponentRegistry::default();
    let component = Component::builder("jobs.Bench", Arc::clone(bench))
        .method("Count", &[], |p, _| {
            let n = p.calls.fetch_add(1, Ordering::SeqCst) + 1;
            job_log!("count {n}");
            Ok(())
        })
        .method("Fail", &[ArgType::String], |_, args| {
            job_log!("failing on purpose");
            anyhow::bail!("{}", args.string(0)?)
        })
        .async_method("Wait", &[], |p, _| p.wait())
        .async_method("Talk", &[ArgType::String, ArgType::Integer], |p, args| async move {
            let name = args.string(0)?.to_string();
            let lines = args.int(1)?;
            p.talk(name, lines).await
        })
        .async_method("Fanout", &[ArgType::String], |p, args| async move {
            let name = args.string(0)?.to_string();
            p.fanout(name).await
        })
        .async_method("Hang", &[], |_, _| async {
            job_log!("hanging");
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<(), anyhow::Error>(())
        })
        .build()
        .unwrap();
    registry.register(component).unwrap();
    registry
}

pub struct Harness {
    pub scheduler: Scheduler,
    pub sink: Arc<MemorySink>,
    pub bench: Arc<Bench>,
}

pub fn harness() -> Harness {
    harness_with(SchedulerConfig::default(), Vec::new())
}

pub fn harness_with(config: SchedulerConfig, extra_sinks: Vec<Arc<dyn LogSink>>) -> Harness {
    let bench = Arc::new(Bench::default());
    let sink = Arc::new(MemorySink::new());
    let mut executor =
        Executor::new(Invoker::new(Arc::new(registry(&bench)))).with_sink(sink.clone());
    for extra in extra_sinks {
        executor = executor.with_sink(extra);
    }
    Harness {
        scheduler: Scheduler::new(config, executor),
        sink,
        bench,
    }
}

pub fn job(name: &str, target: &str) -> JobDefinition {
    JobDefinition::new(JobKey::named(name), HOURLY, target)
}

impl Harness {
    /// Register `definition` and return its first fire time.
    pub fn add(&self, definition: JobDefinition) -> DateTime<Utc> {
        let key = definition.key();
        self.scheduler.add_job(definition).unwrap();
        self.next_fire(&key)
    }

    pub fn next_fire(&self, key: &JobKey) -> DateTime<Utc> {
        self.scheduler.get_job(key).unwrap().next_fire.unwrap()
    }

    /// Poll until no firing of `key` is waiting or running.
    pub async fn wait_idle(&self, key: &JobKey) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.scheduler.get_job(key).unwrap().in_flight > 0 {
            assert!(tokio::time::Instant::now() < deadline, "{key} never went idle");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Poll until `count` firings have entered Running.
    pub async fn wait_started(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.sink.started().len() < count {
            assert!(tokio::time::Instant::now() < deadline, "firings never started");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
