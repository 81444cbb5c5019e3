//! `jobline-invoke`: turns an invocation-target string into a running job body.
//!
//! # Pipeline
//!
//! | Stage    | Entry point                          | Failure            |
//! |----------|--------------------------------------|--------------------|
//! | Parse    | [`target::parse`]                    | [`ParseError`]      |
//! | Resolve  | [`ComponentRegistry::resolve`]       | [`ResolutionError`] |
//! | Invoke   | [`dispatch::invoke`]                 | [`InvocationError`] |
//!
//! [`Invoker::run`] chains all three and tags failures with their [`Stage`].
//! Job bodies write to the current firing's log with [`context::log`] or
//! [`job_log!`], without holding any handle.
//!
//! ```text
//! ReportJob.GenerateReport('daily')
//! SyncJob.Run(true, 1000L, 99.9D, 5)
//! ```

pub mod args;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod target;

pub use args::{Arg, ArgType, Args};
pub use context::ExecutionContext;
pub use dispatch::Invoker;
pub use error::{
    ArgumentError, InvocationError, InvokeError, ParseError, RegistryError, ResolutionError,
    Result, Stage,
};
pub use registry::{Component, ComponentBuilder, ComponentRegistry, HandlerResult, Method, Resolved};
pub use target::{parse, ParsedInvocation};
