//! Built-in `DemoTask` component, handy for smoke-testing a deployment.
//!
//! ```toml
//! [[jobs]]
//! name = "demo-params"
//! cron = "0/30 * * * * ?"
//! target = "DemoTask.MultipleParams('jobline', true, 2000L, 316.50D, 100)"
//! ```

use std::sync::Arc;
use std::time::Duration;

use jobline_invoke::{job_log, ArgType, Args, Component, ComponentRegistry, RegistryError};

pub struct DemoTask;

impl DemoTask {
    fn no_params(&self, _args: &Args) -> anyhow::Result<()> {
        job_log!("running without parameters");
        Ok(())
    }

    fn single_param(&self, args: &Args) -> anyhow::Result<()> {
        job_log!("running with one parameter: {}", args.string(0)?);
        Ok(())
    }

    fn multiple_params(&self, args: &Args) -> anyhow::Result<()> {
        job_log!(
            "running with parameters: s={} b={} l={} d={} i={}",
            args.string(0)?,
            args.bool(1)?,
            args.long(2)?,
            args.double(3)?,
            args.int(4)?
        );
        Ok(())
    }

    async fn sleep(self: Arc<Self>, args: Args) -> anyhow::Result<()> {
        let millis = args.long(0)?;
        if millis < 0 {
            anyhow::bail!("sleep duration must not be negative, got {millis}ms");
        }
        job_log!("sleeping {millis}ms");
        tokio::time::sleep(Duration::from_millis(millis as u64)).await;
        job_log!("awake");
        Ok(())
    }
}

pub fn register(registry: &ComponentRegistry) -> Result<(), RegistryError> {
    let component = Component::builder("jobs.DemoTask", Arc::new(DemoTask))
        .method("NoParams", &[], DemoTask::no_params)
        .method("SingleParam", &[ArgType::String], DemoTask::single_param)
        .method(
            "MultipleParams",
            &[
                ArgType::String,
                ArgType::Bool,
                ArgType::Long,
                ArgType::Double,
                ArgType::Integer,
            ],
            DemoTask::multiple_params,
        )
        .async_method("Sleep", &[ArgType::Long], DemoTask::sleep)
        .build()?;
    registry.register(component)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobline_core::JobKey;
    use jobline_invoke::{ExecutionContext, Invoker};

    async fn run(target: &str) -> (jobline_invoke::Result<()>, Vec<String>) {
        let registry = ComponentRegistry::default();
        register(&registry).unwrap();
        let invoker = Invoker::new(Arc::new(registry));
        let ctx = ExecutionContext::open(JobKey::named("demo"), target);
        let outcome = ctx.scope(invoker.run(target)).await;
        let lines = ctx.lines().into_iter().map(|l| l.text).collect();
        (outcome, lines)
    }

    #[tokio::test]
    async fn multiple_params_receive_typed_values() {
        let (outcome, lines) = run("DemoTask.MultipleParams('x', true, 1000L, 9.99D, 2)").await;
        outcome.unwrap();
        assert_eq!(
            lines,
            vec!["running with parameters: s=x b=true l=1000 d=9.99 i=2"]
        );
    }

    #[tokio::test]
    async fn single_param_keeps_spaces() {
        let (outcome, lines) = run("DemoTask.SingleParam('hello world')").await;
        outcome.unwrap();
        assert_eq!(lines, vec!["running with one parameter: hello world"]);
    }

    #[tokio::test]
    async fn sleep_widens_an_integer_argument() {
        let (outcome, lines) = run("jobs.DemoTask.Sleep(5)").await;
        outcome.unwrap();
        assert_eq!(lines, vec!["sleeping 5ms", "awake"]);
    }

    #[tokio::test]
    async fn negative_sleep_is_a_fault() {
        let (outcome, _) = run("DemoTask.Sleep(-1L)").await;
        assert!(outcome.unwrap_err().to_string().contains("must not be negative"));
    }
}
