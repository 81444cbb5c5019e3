use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::debug;

use crate::args::{Arg, Args};
use crate::context;
use crate::error::{ArgumentError, InvocationError, Result};
use crate::registry::{ComponentRegistry, Handler, Method, Resolved};
use crate::target::{parse, ParsedInvocation};

/// Call `method` with `args`.
///
/// Asynchronous handlers are awaited on the calling task; synchronous ones run
/// on the blocking pool with the current execution context carried over.
/// Arguments are coerced to the declared parameter types first. Errors
/// returned by the handler become [`InvocationError::Fault`]; a panic in
/// the handler, or in the future it returns, becomes
/// [`InvocationError::Panicked`].
pub async fn invoke(method: &Method, args: Vec<Arg>) -> std::result::Result<(), InvocationError> {
    let args = bind(method, args)?;

    match &method.handler {
        Handler::Sync(f) => {
            let f = Arc::clone(f);
            match context::spawn_blocking(move || f(&args)).await {
                Ok(result) => result.map_err(InvocationError::Fault),
                Err(e) if e.is_panic() => Err(InvocationError::Panicked(panic_message(e.into_panic()))),
                Err(e) => Err(InvocationError::Fault(anyhow::anyhow!("job body did not complete: {e}"))),
            }
        }
        Handler::Async(f) => {
            let fut = panic::catch_unwind(AssertUnwindSafe(|| f(args)))
                .map_err(|payload| InvocationError::Panicked(panic_message(payload)))?;
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result.map_err(InvocationError::Fault),
                Err(payload) => Err(InvocationError::Panicked(panic_message(payload))),
            }
        }
    }
}

fn bind(method: &Method, args: Vec<Arg>) -> std::result::Result<Args, ArgumentError> {
    let params = method.params();
    if args.len() != params.len() {
        return Err(ArgumentError::Arity {
            given: args.len(),
            expected: params.len(),
        });
    }
    let bound = args
        .into_iter()
        .zip(params)
        .enumerate()
        .map(|(index, (arg, &expected))| {
            let actual = arg.arg_type();
            arg.coerce(expected).ok_or(ArgumentError::Mismatch {
                index,
                expected,
                actual,
            })
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Args::new(bound))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Parse → resolve → invoke pipeline over a shared [`ComponentRegistry`].
#[derive(Clone)]
pub struct Invoker {
    registry: Arc<ComponentRegistry>,
}

impl Invoker {
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn prepare(&self, target: &str) -> Result<(ParsedInvocation, Resolved)> {
        let parsed = parse(target)?;
        let resolved =
            self.registry
                .resolve(&parsed.component, &parsed.method, &parsed.arg_types())?;
        Ok((parsed, resolved))
    }

    /// Parse and resolve `target` without calling anything.
    pub fn check(&self, target: &str) -> Result<Resolved> {
        self.prepare(target).map(|(_, resolved)| resolved)
    }

    /// Run `target` to completion on the calling task.
    ///
    /// Call it inside [`ExecutionContext::scope`](crate::ExecutionContext::scope)
    /// so the job body's log lines land in the firing's context.
    pub async fn run(&self, target: &str) -> Result<()> {
        let (parsed, resolved) = self.prepare(target)?;
        if let Some(note) = &resolved.ambiguity {
            context::log(note.clone());
        }
        debug!(
            component = %resolved.component,
            method = resolved.method.name(),
            args = parsed.args.len(),
            "invoking"
        );
        invoke(&resolved.method, parsed.args).await?;
        Ok(())
    }
}
