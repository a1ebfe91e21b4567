//! Logging for the intake and delivery paths.
//!
//! Every event sits inside a span naming its direction: `incoming` for SMTP
//! lines read from a peer, `outgoing` for lines written to one, `internal` for
//! everything the server does on its own. Filtering on the span name separates
//! protocol traffic from lifecycle events.

use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Emit `$msg` at `$level` inside a span called `$span`.
#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

/// SMTP lines written to a peer: session replies, or commands the relay
/// client sends upstream. Defaults to `TRACE`.
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

/// SMTP lines read from a peer: client commands in a session, or replies from
/// the upstream relay. Defaults to `TRACE`.
#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

/// Server lifecycle events: sessions opening and closing, messages queued and
/// delivered, workers starting and the shutdown sequence. Defaults to `TRACE`.
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    }
}

/// Resolve a `LOG_LEVEL` value, falling back to the build default.
fn level_from(value: Option<&str>) -> LevelFilter {
    let default = default_level();

    value.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Install the global subscriber. Only events from `posta*` targets are shown.
pub fn init() {
    let level = level_from(std::env::var("LOG_LEVEL").ok().as_deref());

    let installed = tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("posta")
                })),
        )
        .try_init();

    if let Err(err) = installed {
        eprintln!("Logging already initialised: {err}");
    }
}
