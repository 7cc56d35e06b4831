//! Logging setup: every event goes to the console and is appended to the
//! configured log file. The file is never truncated; `/logs` serves its tail.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking file writer alive. Dropping it flushes the file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        "wildwings=debug,tower_http=debug"
    } else {
        "wildwings=info,tower_http=info"
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the log file's parent directory cannot be created.
pub fn init_logging(logfile_path: &Path, debug: bool) -> Result<LoggingGuard, io::Error> {
    let dir = match logfile_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = logfile_path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("log file path has no file name: {}", logfile_path.display()),
        )
    })?;
    std::fs::create_dir_all(dir)?;

    // `rolling::never` opens the file in append mode
    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(debug).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stdout))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false),
        )
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_raises_default_level() {
        assert!(default_filter(true).contains("wildwings=debug"));
        assert!(default_filter(false).contains("wildwings=info"));
    }
}
