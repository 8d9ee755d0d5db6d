pub use log::*;

use std::io::Write;

static LOGGER: Logger = Logger;

/// Installs the stderr logger and caps records at `level`.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    set_logger(&LOGGER).map(|()| set_max_level(level))
}

/// Maps a repeated `-v` count to a filter: none is warnings only, each
/// occurrence opens one more level.
pub fn level_from_verbosity(occurrences: u64) -> LevelFilter {
    match occurrences {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

#[derive(Copy, Clone)]
struct Logger;

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        eprintln!(
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
