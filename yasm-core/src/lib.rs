//! # yasm-core
//!
//! Declarative finite-state machines.
//!
//! This crate provides:
//! - Declaration documents (JSON/YAML) and their two-pass compilation into
//!   immutable machine graphs
//! - Action and condition registries for the embedding application's logic
//! - A synchronous executor with ordered entry/exit/transition actions
//! - Transition listeners
//!
//! ```
//! use std::sync::Arc;
//! use yasm_core::{action_fn, condition_fn, Context, DocumentFormat, Executor, Loader};
//!
//! let mut loader = Loader::inline(
//!     r#"
//! states:
//!   - id: idle
//!     initial: true
//!     transitions:
//!       - {event: start, target: running, actions: [count]}
//!   - id: running
//!     transitions:
//!       - {event: stop, target: done, condition: may_stop}
//!   - id: done
//!     final: true
//! "#,
//!     DocumentFormat::Yaml,
//! );
//! loader
//!     .register_action("count", action_fn(|ctx: &mut Context| {
//!         ctx.set("started", true);
//!     }))
//!     .register_condition("may_stop", condition_fn(|_: &Context| true));
//!
//! let machine = Arc::new(loader.compile()?);
//! let mut executor = Executor::new(machine, Context::named("job"));
//! executor.start()?;
//! executor.fire("start")?;
//! executor.fire("stop")?;
//! assert!(executor.is_final());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod capability;
pub mod context;
pub mod definition;
pub mod document;
pub mod error;
pub mod executor;
pub mod listener;
pub mod loader;

pub use capability::{
    action_fn, condition_fn, try_action_fn, try_condition_fn, Action, ActionRef, ActionRegistry,
    Condition, ConditionRef, ConditionRegistry, Registry,
};
pub use context::Context;
pub use definition::{Machine, MachineBuilder, State, StateId, Transition};
pub use document::{DocumentFormat, MachineDocument, Source};
pub use error::{CapabilityError, ExecutionError, LoadError, ParseError, ValidationError};
pub use executor::{Executor, Outcome};
pub use listener::{ListenerSet, TransitionEvent, TransitionListener, TransitionLog};
pub use loader::{compile_document, Loader};
