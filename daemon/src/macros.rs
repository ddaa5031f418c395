//! Custom macros for reducing code repetition in the controller

/// Log a warning and continue execution (non-fatal error handling)
///
/// # Example
/// ```ignore
/// log_and_continue!(hook.apply(&frame).await, "update masking wallpaper");
/// ```
#[macro_export]
macro_rules! log_and_continue {
    ($expr:expr, $context:expr) => {
        if let Err(e) = $expr {
            log::warn!("Failed to {}: {}", $context, e);
        }
    };
}
