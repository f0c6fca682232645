//! Invariant checking for caller-contract violations.
//!
//! Precondition breaches (double registration, state updates on an
//! unregistered camera, opening without a granted slot) are not
//! recoverable. They are raised through [`assert_invariant!`], which also
//! records every checked invariant so tests can assert a contract was
//! actually exercised.
//!
//! ```rust,ignore
//! use camgate::invariant_ppt::*;
//!
//! assert_invariant!(
//!     registered,
//!     "Camera must be registered before its state is updated",
//!     "CameraStateRegistry::mark_camera_state"
//! );
//!
//! #[test]
//! fn contract_state_registry() {
//!     contract_test("state registry", &[
//!         "Camera must be registered before its state is updated",
//!     ]);
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::thread_local;

thread_local! {
    static INVARIANT_LOG: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

/// Assert an invariant and log it for contract testing.
///
/// # Panics
/// Panics if the condition is false.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn __assert_invariant_impl(condition: bool, message: &str, context: Option<&str>) {
    INVARIANT_LOG.with(|log| {
        log.borrow_mut().insert(message.to_string());
    });

    if !condition {
        let ctx = context.unwrap_or("unknown");
        log::error!("Invariant violated in {}: {}", ctx, message);
        panic!("INVARIANT VIOLATION [{}]: {}", ctx, message);
    }
}

/// Check that specific invariants were verified on this thread.
///
/// # Panics
/// Panics if any required invariant was not checked.
pub fn contract_test(test_name: &str, required_invariants: &[&str]) {
    let log = INVARIANT_LOG.with(|log| log.borrow().clone());

    let missing: Vec<&str> = required_invariants
        .iter()
        .copied()
        .filter(|invariant| !log.contains(*invariant))
        .collect();

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: The following invariants were not checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}

/// Clear the invariant log for the current thread.
pub fn clear_invariant_log() {
    INVARIANT_LOG.with(|log| {
        log.borrow_mut().clear();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passing_invariant_is_logged() {
        clear_invariant_log();
        assert_invariant!(true, "always holds", "tests");
        contract_test("logged", &["always holds"]);
    }

    #[test]
    #[should_panic(expected = "INVARIANT VIOLATION [tests]: never holds")]
    fn test_failing_invariant_panics() {
        assert_invariant!(false, "never holds", "tests");
    }

    #[test]
    #[should_panic(expected = "CONTRACT FAILURE")]
    fn test_contract_reports_missing() {
        clear_invariant_log();
        contract_test("missing", &["not checked"]);
    }
}
