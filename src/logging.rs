//! File-backed logging so diagnostics never fight the alternate screen.

use std::path::Path;

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};

const LOG_BASENAME: &str = "knull";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 3;

/// Starts rotating file logs under `<base>/logs`. The handle must stay
/// alive for the process lifetime; callers keep it in `main`. Level
/// comes from `RUST_LOG` when set (e.g. `debug`), else `info`.
pub fn init(base: &Path) -> Result<LoggerHandle, String> {
    let log_dir = base.join("logs");
    std::fs::create_dir_all(&log_dir)
        .map_err(|err| format!("failed to create log directory `{}`: {err}", log_dir.display()))?;

    Logger::try_with_env_or_str("info")
        .map_err(|err| format!("invalid log level: {err}"))?
        .log_to_file(
            FileSpec::default()
                .directory(&log_dir)
                .basename(LOG_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))
}
