//! Builds the async-drained terminal logger used by composition roots and
//! tests. Every long-lived component takes a `slog::Logger` as an explicit
//! constructor argument (§9 "Global singletons") rather than reaching for a
//! global — the same discipline `maelstrom-broker`/`maelstrom-client` apply.

use slog::{o, Drain, Level, Logger};
use std::str::FromStr;

pub fn root_logger(level: &str) -> Logger {
    let level = Level::from_str(level).unwrap_or(Level::Info);
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog::LevelFilter::new(drain, level).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!("component" => "orcaops"))
}

/// A logger that discards everything, for tests that don't care about log
/// output but still need to satisfy a constructor signature.
pub fn discard_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}
