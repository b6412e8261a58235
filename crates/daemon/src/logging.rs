// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use eyre::WrapErr;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use fen_kernel::config::LoggingConfig;

#[derive(Clone)]
struct FileWriter(Arc<File>);

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        (&*self.0).flush()
    }
}

// Shift fen.log -> fen.log.1 -> fen.log.2 ... keeping `count` old files.
fn rotate(path: &Path, count: u32) {
    if count == 0 || !path.exists() {
        return;
    }
    let suffixed = |i: u32| {
        let mut p = path.as_os_str().to_os_string();
        p.push(format!(".{i}"));
        std::path::PathBuf::from(p)
    };
    for i in (1..count).rev() {
        let _ = std::fs::rename(suffixed(i), suffixed(i + 1));
    }
    let _ = std::fs::rename(path, suffixed(1));
}

/// Install the global subscriber per config. The debug flag wins over the
/// configured level. Fatal on failure, like any other startup config error.
pub fn init(config: &LoggingConfig, debug: bool) -> Result<(), eyre::Error> {
    let level = if debug { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_new(level)
        .wrap_err_with(|| format!("invalid logging level {level:?}"))?;

    let console_layer = config.console.then(|| fmt::layer().compact().with_ansi(true));

    let file_layer = if config.file {
        rotate(&config.file_path, config.rotation_count);
        let file = File::options()
            .create(true)
            .append(true)
            .open(&config.file_path)
            .wrap_err_with(|| format!("unable to open log file {}", config.file_path.display()))?;
        let writer = FileWriter(Arc::new(file));
        Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(move || writer.clone()),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .wrap_err("unable to install logging subscriber")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_shifts_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("fen.log");
        std::fs::write(&log, "current").unwrap();
        std::fs::write(dir.path().join("fen.log.1"), "older").unwrap();

        rotate(&log, 3);

        assert!(!log.exists());
        assert_eq!(std::fs::read_to_string(dir.path().join("fen.log.1")).unwrap(), "current");
        assert_eq!(std::fs::read_to_string(dir.path().join("fen.log.2")).unwrap(), "older");
    }

    #[test]
    fn test_rotation_caps_kept_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("fen.log");
        for i in 1..=2u32 {
            std::fs::write(dir.path().join(format!("fen.log.{i}")), i.to_string()).unwrap();
        }
        std::fs::write(&log, "current").unwrap();

        rotate(&log, 2);

        // Keeps .1 and .2; the old .2 fell off the end.
        assert_eq!(std::fs::read_to_string(dir.path().join("fen.log.1")).unwrap(), "current");
        assert_eq!(std::fs::read_to_string(dir.path().join("fen.log.2")).unwrap(), "1");
    }
}
