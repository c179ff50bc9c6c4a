use redox_log::{OutputBuilder, RedoxLogger};

/// Maps a numeric verbosity (as given on the command line or by the host) onto a log level.
///
/// `0` keeps only warnings and errors, `1` adds informational messages, `2` adds per-request
/// tracing and anything above that enables everything.
pub fn verbosity_level(verbosity: i32) -> log::LevelFilter {
    match verbosity {
        i32::MIN..=0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

/// Configures logging for a single daemon.
///
/// The stderr output accepts everything; the effective level is the global max level, which
/// starts out as `output_level` and may be changed at runtime with [log::set_max_level].
pub fn setup_logging(name: &str, output_level: log::LevelFilter) {
    let logger = RedoxLogger::new().with_output(
        OutputBuilder::stderr()
            .with_filter(log::LevelFilter::Trace)
            .with_ansi_escape_codes()
            .flush_on_newline(true)
            .build(),
    );

    match logger.enable() {
        Ok(_) => log::set_max_level(output_level),
        Err(error) => eprintln!("{name}: failed to set default logger: {error}"),
    }
}
