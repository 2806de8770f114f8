//! Merge events are logged as `event=<name> component=summing_sorted <k=v ...>`
//! under one target, so a subscriber can filter the whole merge at once.

pub(crate) const LOG_TARGET: &str = "summing_merge";

pub(crate) const COMPONENT: &str = "summing_sorted";

/// Logs a merge event: `merge_log!(level, "event_name", "k={} ...", args...)`.
macro_rules! merge_log {
    ($level:expr, $event:literal, $($arg:tt)+) => {
        log::log!(
            target: $crate::logging::LOG_TARGET,
            $level,
            "event={} component={} {}",
            $event,
            $crate::logging::COMPONENT,
            format_args!($($arg)+)
        )
    };
}

pub(crate) use merge_log;
