mod common;

use common::{CapturingSink, Counter, IoFailure, ValueFailure};
use guardcall::{Failure, FailureType, Guard, GuardError, Handler, HandlerOptions, blocking};

fn counting(counter: &Counter, value: Option<&'static str>) -> Handler<(), String> {
    let counter = counter.clone();
    blocking(move |(), _ctx| {
        counter.hit();
        Ok(value.map(str::to_string))
    })
}

fn raise(failure: Failure) -> Handler<(), String> {
    blocking(move |(), _ctx| Err(failure.clone()))
}

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

#[test]
fn else_without_handlers_fails_before_body_runs() {
    let body_runs = Counter::new();
    let finally_runs = Counter::new();
    let guard = Guard::<(), String>::builder()
        .on_else(blocking(|(), _ctx| Ok(None)))
        .on_finally(counting(&finally_runs, None))
        .build();

    let failure = guard
        .wrap(counting(&body_runs, Some("ran")))
        .call_blocking(())
        .unwrap_err();

    let err = failure.downcast_ref::<GuardError>().unwrap();
    assert!(err.is_configuration());
    assert_eq!(body_runs.get(), 0);
    assert_eq!(finally_runs.get(), 0);
}

#[test]
fn validation_reflects_state_at_call_time() {
    let guard = Guard::<(), String>::builder()
        .on_else(blocking(|(), _ctx| Ok(Some("else".to_string()))))
        .build();
    let body = guard.wrap(blocking(|(), _ctx| Ok(None)));
    assert!(body.call_blocking(()).is_err());

    guard.register_catch_all(blocking(|(), _ctx| Ok(None)));
    assert_eq!(body.call_blocking(()).unwrap().as_deref(), Some("else"));
}

// ----------------------------------------------------------------------------
// Else
// ----------------------------------------------------------------------------

#[test]
fn else_skipped_when_body_returns_value() {
    let else_runs = Counter::new();
    let guard = Guard::<(), String>::builder()
        .catch_all(blocking(|(), _ctx| Ok(None)))
        .on_else(counting(&else_runs, Some("else")))
        .build();

    let result = guard
        .wrap(blocking(|(), _ctx| Ok(Some("normal".to_string()))))
        .call_blocking(());
    assert_eq!(result.unwrap().as_deref(), Some("normal"));
    assert_eq!(else_runs.get(), 0);
}

#[test]
fn else_runs_when_body_returns_nothing() {
    let else_runs = Counter::new();
    let guard = Guard::<(), String>::builder()
        .catch_all(blocking(|(), _ctx| Ok(None)))
        .on_else(counting(&else_runs, Some("from else")))
        .build();

    let result = guard.wrap(blocking(|(), _ctx| Ok(None))).call_blocking(());
    assert_eq!(result.unwrap().as_deref(), Some("from else"));
    assert_eq!(else_runs.get(), 1);
}

#[test]
fn else_not_run_on_failure() {
    let else_runs = Counter::new();
    let guard = Guard::<(), String>::builder()
        .catch_all(blocking(|(), _ctx| Ok(Some("handled".to_string()))))
        .on_else(counting(&else_runs, Some("else")))
        .build();

    let result = guard.wrap(raise(Failure::msg("x"))).call_blocking(());
    assert_eq!(result.unwrap().as_deref(), Some("handled"));
    assert_eq!(else_runs.get(), 0);
}

#[test]
fn else_failure_propagates() {
    let guard = Guard::<(), String>::builder()
        .catch_all(blocking(|(), _ctx| Ok(None)))
        .on_else(raise(Failure::new(ValueFailure::new("else broke"))))
        .build();
    let failure = guard
        .wrap(blocking(|(), _ctx| Ok(None)))
        .call_blocking(())
        .unwrap_err();
    assert!(failure.is::<ValueFailure>());
}

#[test]
fn no_value_anywhere_yields_none() {
    let guard = Guard::<(), String>::builder().build();
    let result = guard.wrap(blocking(|(), _ctx| Ok(None))).call_blocking(());
    assert_eq!(result.unwrap(), None);
}

// ----------------------------------------------------------------------------
// Finally
// ----------------------------------------------------------------------------

#[test]
fn finally_value_overrides_body_value() {
    let guard = Guard::<(), String>::builder()
        .on_finally(blocking(|(), _ctx| Ok(Some("final".to_string()))))
        .build();
    let result = guard
        .wrap(blocking(|(), _ctx| Ok(Some("normal".to_string()))))
        .call_blocking(());
    assert_eq!(result.unwrap().as_deref(), Some("final"));
}

#[test]
fn finally_value_overrides_handler_value() {
    let guard = Guard::<(), String>::builder()
        .catch_all(blocking(|(), _ctx| Ok(Some("handled".to_string()))))
        .on_finally(blocking(|(), _ctx| Ok(Some("final".to_string()))))
        .build();
    let result = guard.wrap(raise(Failure::msg("x"))).call_blocking(());
    assert_eq!(result.unwrap().as_deref(), Some("final"));
}

#[test]
fn finally_value_overrides_else_value() {
    let guard = Guard::<(), String>::builder()
        .catch_all(blocking(|(), _ctx| Ok(None)))
        .on_else(blocking(|(), _ctx| Ok(Some("from else".to_string()))))
        .on_finally(blocking(|(), _ctx| Ok(Some("final".to_string()))))
        .build();
    let result = guard.wrap(blocking(|(), _ctx| Ok(None))).call_blocking(());
    assert_eq!(result.unwrap().as_deref(), Some("final"));
}

#[test]
fn finally_without_value_keeps_pending_result() {
    let finally_runs = Counter::new();
    let guard = Guard::<(), String>::builder()
        .on_finally(counting(&finally_runs, None))
        .build();
    let result = guard
        .wrap(blocking(|(), _ctx| Ok(Some("normal".to_string()))))
        .call_blocking(());
    assert_eq!(result.unwrap().as_deref(), Some("normal"));
    assert_eq!(finally_runs.get(), 1);
}

#[test]
fn finally_runs_on_unhandled_failure_without_swallowing_it() {
    let finally_runs = Counter::new();
    let guard = Guard::<(), String>::builder()
        .catch(
            [FailureType::of::<IoFailure>()],
            blocking(|(), _ctx| Ok(None)),
            HandlerOptions::new(),
        )
        .on_finally(counting(&finally_runs, Some("final")))
        .build();

    let original = Failure::new(ValueFailure::new("unhandled"));
    let escaped = guard
        .wrap(raise(original.clone()))
        .call_blocking(())
        .unwrap_err();

    assert!(Failure::ptr_eq(&escaped, &original));
    assert_eq!(finally_runs.get(), 1);
}

#[test]
fn finally_failure_replaces_pending_result() {
    let guard = Guard::<(), String>::builder()
        .on_finally(raise(Failure::new(IoFailure("cleanup failed".into()))))
        .build();
    let failure = guard
        .wrap(blocking(|(), _ctx| Ok(Some("normal".to_string()))))
        .call_blocking(());
    assert!(failure.unwrap_err().is::<IoFailure>());
}

#[test]
fn finally_failure_replaces_pending_failure() {
    let guard = Guard::<(), String>::builder()
        .on_finally(raise(Failure::new(IoFailure("cleanup failed".into()))))
        .build();
    let failure = guard
        .wrap(raise(Failure::new(ValueFailure::new("body failed"))))
        .call_blocking(())
        .unwrap_err();
    assert!(failure.is::<IoFailure>());
}

#[test]
fn finally_runs_after_handler_failure() {
    let finally_runs = Counter::new();
    let guard = Guard::<(), String>::builder()
        .catch_all(raise(Failure::new(IoFailure("handler failed".into()))))
        .on_finally(counting(&finally_runs, None))
        .build();
    let failure = guard
        .wrap(raise(Failure::msg("body failed")))
        .call_blocking(())
        .unwrap_err();
    assert!(failure.is::<IoFailure>());
    assert_eq!(finally_runs.get(), 1);
}

// ----------------------------------------------------------------------------
// Nesting
// ----------------------------------------------------------------------------

#[test]
fn blocking_calls_nest() {
    let inner_guard = Guard::<(), String>::builder()
        .catch_all(blocking(|(), _ctx| Ok(Some("inner handled".to_string()))))
        .build();
    let inner = inner_guard.wrap(raise(Failure::msg("inner failed")));

    let outer_guard = Guard::<(), String>::builder()
        .on_finally(blocking(|(), ctx| {
            assert!(ctx.is_active());
            Ok(None)
        }))
        .build();
    let outer = outer_guard.wrap(blocking(move |(), ctx| {
        let value = inner.call_blocking(())?;
        ctx.set("inner", value.clone())?;
        Ok(value.map(|v| format!("outer saw {v}")))
    }));

    assert_eq!(
        outer.call_blocking(()).unwrap().as_deref(),
        Some("outer saw inner handled")
    );
}

#[test]
fn nested_failure_propagates_through_outer_guard() {
    let inner = Guard::<(), String>::builder()
        .build()
        .wrap(raise(Failure::new(IoFailure("deep".into()))));
    let outer = Guard::<(), String>::builder()
        .catch(
            [FailureType::of::<IoFailure>()],
            blocking(|(), _ctx| Ok(Some("outer handled".to_string()))),
            HandlerOptions::new(),
        )
        .build()
        .wrap(blocking(move |(), _ctx| inner.call_blocking(())));

    assert_eq!(
        outer.call_blocking(()).unwrap().as_deref(),
        Some("outer handled")
    );
}

// ----------------------------------------------------------------------------
// Debug bypass
// ----------------------------------------------------------------------------

#[test]
fn global_debug_reraises_and_skips_handler() {
    let handler_runs = Counter::new();
    let finally_runs = Counter::new();
    let guard = Guard::<(), String>::builder()
        .debug(true)
        .catch(
            [FailureType::of::<IoFailure>()],
            counting(&handler_runs, Some("handled")),
            HandlerOptions::new(),
        )
        .on_finally(counting(&finally_runs, None))
        .build();

    let original = Failure::new(IoFailure("disk".into()));
    let escaped = guard
        .wrap(raise(original.clone()))
        .call_blocking(())
        .unwrap_err();

    assert!(Failure::ptr_eq(&escaped, &original));
    assert_eq!(handler_runs.get(), 0);
    assert_eq!(finally_runs.get(), 1);
}

#[test]
fn handler_override_off_beats_global_debug() {
    let guard = Guard::<(), String>::builder()
        .debug(true)
        .catch_all(blocking(|(), _ctx| Ok(Some("handled".to_string()))))
        .catch(
            [FailureType::of::<IoFailure>()],
            blocking(|(), _ctx| Ok(Some("io handled".to_string()))),
            HandlerOptions::new().debug(false),
        )
        .build();

    let io = guard.wrap(raise(Failure::new(IoFailure("x".into()))));
    assert_eq!(io.call_blocking(()).unwrap().as_deref(), Some("io handled"));

    let other = guard.wrap(raise(Failure::msg("y")));
    assert!(other.call_blocking(()).is_err());
}

#[test]
fn handler_override_on_beats_global_default() {
    let guard = Guard::<(), String>::builder()
        .catch(
            [FailureType::of::<IoFailure>()],
            blocking(|(), _ctx| Ok(Some("handled".to_string()))),
            HandlerOptions::new().debug(true),
        )
        .build();
    let result = guard
        .wrap(raise(Failure::new(IoFailure("x".into()))))
        .call_blocking(());
    assert!(result.unwrap_err().is::<IoFailure>());
}

#[test]
fn debug_toggle_applies_to_next_call() {
    let guard = Guard::<(), String>::builder()
        .catch_all(blocking(|(), _ctx| Ok(Some("handled".to_string()))))
        .build();
    let body = guard.wrap(raise(Failure::msg("x")));
    assert!(body.call_blocking(()).is_ok());
    guard.set_debug(true);
    assert!(body.call_blocking(()).is_err());
    guard.set_debug(false);
    assert!(body.call_blocking(()).is_ok());
}

#[test]
fn bypassed_failure_is_still_logged() {
    let sink = CapturingSink::new();
    let guard = Guard::<(), String>::builder()
        .debug(true)
        .sink(sink.clone())
        .catch_all(blocking(|(), _ctx| Ok(None)))
        .build();
    let _ = guard.wrap(raise(Failure::msg("logged"))).call_blocking(());
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, "logged");
}
