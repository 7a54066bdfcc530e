//! Reset and DFU-mode control lines.
//!
//! Both lines are active-low: driving `Reset` low holds the nRF52 in reset,
//! driving `DfuMode` low while reset is released makes it boot into the
//! bootloader.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Failed to drive {line} {level} via {path}: {source}")]
    Gpio {
        line: Line,
        level: Level,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    Reset,
    DfuMode,
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Reset => write!(f, "RESET"),
            Line::DfuMode => write!(f, "DFU_MODE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => write!(f, "low"),
            Level::High => write!(f, "high"),
        }
    }
}

/// Output pins wired to the target.
pub trait ControlLines: Send {
    fn set(&mut self, line: Line, level: Level) -> Result<(), ControlError>;
}

/// Lines exported through the Linux sysfs GPIO interface.
///
/// Each line is the path of an already-exported, output-configured
/// `/sys/class/gpio/gpioN/value` file.
#[derive(Debug, Clone)]
pub struct SysfsGpioLines {
    reset: PathBuf,
    dfu_mode: PathBuf,
}

impl SysfsGpioLines {
    pub fn new(reset: impl AsRef<Path>, dfu_mode: impl AsRef<Path>) -> Self {
        Self {
            reset: reset.as_ref().to_path_buf(),
            dfu_mode: dfu_mode.as_ref().to_path_buf(),
        }
    }

    fn path(&self, line: Line) -> &Path {
        match line {
            Line::Reset => &self.reset,
            Line::DfuMode => &self.dfu_mode,
        }
    }
}

impl ControlLines for SysfsGpioLines {
    fn set(&mut self, line: Line, level: Level) -> Result<(), ControlError> {
        let path = self.path(line);
        let value: &[u8] = match level {
            Level::Low => b"0",
            Level::High => b"1",
        };
        OpenOptions::new()
            .write(true)
            .open(path)
            .and_then(|mut file| file.write_all(value))
            .map_err(|source| ControlError::Gpio {
                line,
                level,
                path: path.to_path_buf(),
                source,
            })?;
        debug!(line = %line, level = %level, "Control line set");
        Ok(())
    }
}

/// Records every transition. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingLines {
    log: Arc<Mutex<Vec<(Line, Level)>>>,
}

impl RecordingLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transitions(&self) -> Vec<(Line, Level)> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Last level driven on `line`, if any.
    pub fn level(&self, line: Line) -> Option<Level> {
        self.transitions()
            .iter()
            .rev()
            .find(|(l, _)| *l == line)
            .map(|(_, level)| *level)
    }

    pub fn clear(&self) {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl ControlLines for RecordingLines {
    fn set(&mut self, line: Line, level: Level) -> Result<(), ControlError> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((line, level));
        Ok(())
    }
}
