//! Panic isolation for application callbacks.
//!
//! Handlers and interactor callbacks are application code. A panic in one of
//! them is logged and swallowed so that sibling callbacks still run and no
//! internal index is left half-updated.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::error;

/// Run `f`, returning `None` if it panicked.
///
/// `what` names the callback in the log record.
pub fn invoke_isolated<R>(what: &str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            error!(
                callback = what,
                reason = %panic_reason(payload.as_ref()),
                "Callback panicked; continuing with remaining callbacks"
            );
            None
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_value_when_callback_succeeds() {
        assert_eq!(invoke_isolated("ok", || 7), Some(7));
    }

    #[test]
    fn swallows_panics() {
        let result: Option<()> = invoke_isolated("boom", || panic!("handler failure"));
        assert_eq!(result, None);
    }
}
