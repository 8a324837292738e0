//! `guardcall` - declarative try/except/else/finally guards
//!
//! A [`Guard`] holds failure handlers keyed by [`FailureType`], plus
//! optional else and finally handlers. Wrapping a callable with
//! [`Guard::wrap`] yields a [`Guarded`] callable that runs the body, picks
//! the most specific handler for any failure, and exposes an
//! invocation-scoped [`Context`] to every stage.
//!
//! ```rust,ignore
//! use guardcall::{Failure, FailureType, Guard, HandlerOptions, blocking};
//!
//! let guard = Guard::<String, String>::builder()
//!     .logger_name("billing")
//!     .catch(
//!         [FailureType::of::<std::num::ParseIntError>()],
//!         blocking(|_input, ctx| {
//!             let err = ctx.failure("err")?;
//!             Ok(Some(format!("recovered:{err}")))
//!         }),
//!         HandlerOptions::new().alias("err"),
//!     )
//!     .build();
//!
//! let parse = guard.wrap(blocking(|input: String, _ctx| {
//!     Ok(Some(input.parse::<i64>()?.to_string()))
//! }));
//! assert_eq!(parse.call_blocking("12".into())?, Some("12".into()));
//! ```

pub mod call;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod failure;
pub mod observability;
pub mod registry;

pub use call::{Blocking, Call, Handler, Outcome, Suspending, blocking, suspending};
pub use config::GuardConfig;
pub use context::Context;
pub use engine::{Guard, GuardBuilder, Guarded};
pub use error::{ConfigError, GuardError};
pub use failure::{Failure, FailureType, MessageFailure};
pub use registry::{DebugOverride, HandlerEntry, HandlerOptions, HandlerRegistry};
