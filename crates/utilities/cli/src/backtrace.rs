//! Helper to set the backtrace env var.

use std::sync::Once;

static INIT: Once = Once::new();

/// Sets the `RUST_BACKTRACE` environment variable to `1` if it is not already set.
///
/// Must be called at the start of `main`, before the async runtime spawns any thread.
pub fn enable() {
    INIT.call_once(|| {
        if std::env::var_os("RUST_BACKTRACE").is_none() {
            // SAFETY: called once, before other threads read the environment.
            unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backtrace_enable_keeps_explicit_value() {
        // SAFETY: the only test touching this variable.
        unsafe { std::env::set_var("RUST_BACKTRACE", "full") };

        enable();
        enable();

        assert_eq!(std::env::var("RUST_BACKTRACE").unwrap(), "full");
    }
}
