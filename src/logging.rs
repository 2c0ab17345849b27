use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;

/// Initialise logging. `debug` enables the `debug` level and lets `RUST_LOG`
/// override it; otherwise the level is forced to `info`.
///
/// When `log_file` is given output is appended to that file instead of
/// stderr. Calling this more than once is harmless: the first subscriber stays.
pub fn init(debug: bool, log_file: Option<PathBuf>) {
    let level = if debug { "debug" } else { "info" };

    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match log_file.as_ref().and_then(|p| split_path(p)) {
        Some((dir, name)) => {
            let appender = tracing_appender::rolling::never(dir, name);
            builder.with_ansi(false).with_writer(appender).try_init()
        }
        None => builder.try_init(),
    };
    if result.is_ok() {
        tracing::debug!(?log_file, "logging initialised");
    }
}

fn split_path(path: &Path) -> Option<(PathBuf, std::ffi::OsString)> {
    let name = path.file_name()?.to_os_string();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Some((dir, name))
}
