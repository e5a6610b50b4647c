//! Tracing subscriber setup: console (pretty or JSON) plus an optional
//! JSON-lines log file from `[logging]`.

use std::path::Path;

use irradiant_config::Logging;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::FILE_GUARD;

fn rotation_for(name: Option<&str>) -> Rotation {
    match name.map(str::to_ascii_lowercase).as_deref() {
        Some("daily") => Rotation::DAILY,
        Some("hourly") => Rotation::HOURLY,
        _ => Rotation::NEVER,
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `--log-level`, which
/// wins over `[logging].level`.
pub fn init(json: bool, cli_level: Option<&str>, cfg: &Logging) {
    let level = cli_level
        .or(cfg.level.as_deref())
        .unwrap_or("info")
        .to_string();
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    // Logs go to stderr so stdout stays clean for results.
    let console = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter())
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter())
            .boxed()
    };

    let file = cfg.file.as_deref().and_then(|path| {
        let path = Path::new(path);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let name = path.file_name()?.to_str()?;
        let appender = match RollingFileAppender::builder()
            .rotation(rotation_for(cfg.rotation.as_deref()))
            .filename_prefix(name)
            .build(dir)
        {
            Ok(a) => a,
            Err(e) => {
                eprintln!("warning: log file {} disabled: {e}", path.display());
                return None;
            }
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter())
                .boxed(),
        )
    });

    let _ = tracing_subscriber::registry().with(console).with(file).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_rotation_means_never() {
        assert_eq!(rotation_for(Some("Daily")), Rotation::DAILY);
        assert_eq!(rotation_for(Some("hourly")), Rotation::HOURLY);
        assert_eq!(rotation_for(Some("weekly")), Rotation::NEVER);
        assert_eq!(rotation_for(None), Rotation::NEVER);
    }
}
