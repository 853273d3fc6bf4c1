//! GPIO line access.
//!
//! Each physical line is a [`DigitalLine`]: configure a direction, read a
//! level, write a level. [`SysfsLine`] drives the Linux sysfs GPIO interface;
//! [`MemoryLine`] keeps the level in memory and records every write so the
//! controller can be exercised without hardware.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Door lock actuator (output).
pub const LOCK_PIN: u32 = 20;
/// Green indicator light (output).
pub const INDICATOR_PIN: u32 = 32;
/// Door-open sensor (input, reads high while the door is open).
pub const DOOR_SENSOR_PIN: u32 = 26;
/// Quit tumbler switch (input, active low).
pub const QUIT_SWITCH_PIN: u32 = 18;
/// Enroll push button (input, active low).
pub const ENROLL_SWITCH_PIN: u32 = 16;
/// Auxiliary output held high while the controller runs.
pub const AUX_PIN: u32 = 12;

/// Default sysfs GPIO root.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_sysfs(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

#[derive(Error, Debug)]
pub enum GpioError {
    #[error("failed to export gpio{pin}: {source}")]
    Export {
        pin: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("gpio{pin} I/O failed at {path}: {source}")]
    Io {
        pin: u32,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("gpio{pin} returned unexpected value {value:?}")]
    InvalidValue { pin: u32, value: String },
}

/// A single digital GPIO line.
pub trait DigitalLine {
    fn configure(&mut self, direction: Direction) -> Result<(), GpioError>;
    /// `true` when the raw line level is high.
    fn read(&mut self) -> Result<bool, GpioError>;
    fn write(&mut self, high: bool) -> Result<(), GpioError>;
}

/// Sysfs-backed GPIO line (`<root>/gpioN/{direction,value}`).
#[derive(Debug, Clone)]
pub struct SysfsLine {
    pin: u32,
    root: PathBuf,
}

impl SysfsLine {
    pub fn new(root: impl Into<PathBuf>, pin: u32) -> Self {
        Self {
            pin,
            root: root.into(),
        }
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    fn line_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    fn io_err(&self, path: &Path, source: std::io::Error) -> GpioError {
        GpioError::Io {
            pin: self.pin,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Export the line through `<root>/export` if its directory is missing.
    fn ensure_exported(&self) -> Result<(), GpioError> {
        if self.line_dir().exists() {
            return Ok(());
        }
        tracing::debug!(pin = self.pin, "exporting gpio line");
        fs::write(self.root.join("export"), self.pin.to_string()).map_err(|source| {
            GpioError::Export {
                pin: self.pin,
                source,
            }
        })
    }
}

impl DigitalLine for SysfsLine {
    fn configure(&mut self, direction: Direction) -> Result<(), GpioError> {
        self.ensure_exported()?;
        let path = self.line_dir().join("direction");
        fs::write(&path, direction.as_sysfs()).map_err(|e| self.io_err(&path, e))?;
        tracing::debug!(pin = self.pin, direction = direction.as_sysfs(), "gpio configured");
        Ok(())
    }

    fn read(&mut self) -> Result<bool, GpioError> {
        let path = self.line_dir().join("value");
        let raw = fs::read_to_string(&path).map_err(|e| self.io_err(&path, e))?;
        match raw.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(GpioError::InvalidValue {
                pin: self.pin,
                value: other.to_string(),
            }),
        }
    }

    fn write(&mut self, high: bool) -> Result<(), GpioError> {
        let path = self.line_dir().join("value");
        fs::write(&path, if high { "1" } else { "0" }).map_err(|e| self.io_err(&path, e))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    level: bool,
    direction: Option<Direction>,
    scripted: VecDeque<bool>,
    writes: Vec<bool>,
    reads: usize,
}

/// In-memory GPIO line.
///
/// Clones share state, so a test can keep one handle while the controller
/// owns another. Reads pop scripted levels first and fall back to the
/// current level once the script is exhausted.
#[derive(Debug, Clone, Default)]
pub struct MemoryLine {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLine {
    pub fn new(level: bool) -> Self {
        let line = Self::default();
        line.lock().level = level;
        line
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue levels returned by the next reads, in order.
    pub fn script(&self, levels: impl IntoIterator<Item = bool>) {
        self.lock().scripted.extend(levels);
    }

    pub fn set_level(&self, level: bool) {
        self.lock().level = level;
    }

    pub fn level(&self) -> bool {
        self.lock().level
    }

    pub fn direction(&self) -> Option<Direction> {
        self.lock().direction
    }

    /// Every level written so far, oldest first.
    pub fn writes(&self) -> Vec<bool> {
        self.lock().writes.clone()
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads
    }
}

impl DigitalLine for MemoryLine {
    fn configure(&mut self, direction: Direction) -> Result<(), GpioError> {
        self.lock().direction = Some(direction);
        Ok(())
    }

    fn read(&mut self) -> Result<bool, GpioError> {
        let mut state = self.lock();
        state.reads += 1;
        Ok(state.scripted.pop_front().unwrap_or(state.level))
    }

    fn write(&mut self, high: bool) -> Result<(), GpioError> {
        let mut state = self.lock();
        state.level = high;
        state.writes.push(high);
        Ok(())
    }
}

/// The six lines of the door controller.
pub struct AccessLines<L> {
    pub lock: L,
    pub indicator: L,
    pub door_sensor: L,
    pub quit_switch: L,
    pub enroll_switch: L,
    pub aux: L,
}

impl AccessLines<SysfsLine> {
    /// Bind the fixed controller pin assignment under a sysfs root.
    pub fn sysfs(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            lock: SysfsLine::new(root, LOCK_PIN),
            indicator: SysfsLine::new(root, INDICATOR_PIN),
            door_sensor: SysfsLine::new(root, DOOR_SENSOR_PIN),
            quit_switch: SysfsLine::new(root, QUIT_SWITCH_PIN),
            enroll_switch: SysfsLine::new(root, ENROLL_SWITCH_PIN),
            aux: SysfsLine::new(root, AUX_PIN),
        }
    }
}

impl<L: DigitalLine> AccessLines<L> {
    /// Set line directions and raise the auxiliary output.
    pub fn configure(&mut self) -> Result<(), GpioError> {
        self.lock.configure(Direction::Out)?;
        self.indicator.configure(Direction::Out)?;
        self.door_sensor.configure(Direction::In)?;
        self.quit_switch.configure(Direction::In)?;
        self.enroll_switch.configure(Direction::In)?;
        self.aux.configure(Direction::Out)?;
        self.aux.write(true)
    }

    /// Switches are wired active low: a raw 0 means pressed.
    pub fn quit_requested(&mut self) -> Result<bool, GpioError> {
        Ok(!self.quit_switch.read()?)
    }

    pub fn enroll_requested(&mut self) -> Result<bool, GpioError> {
        Ok(!self.enroll_switch.read()?)
    }

    pub fn door_open(&mut self) -> Result<bool, GpioError> {
        self.door_sensor.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(root: &Path, pin: u32, value: &str) {
        let dir = root.join(format!("gpio{pin}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("value"), value).unwrap();
        fs::write(dir.join("direction"), "in").unwrap();
    }

    #[test]
    fn test_sysfs_read_write() {
        let root = tempfile::tempdir().unwrap();
        fake_sysfs(root.path(), LOCK_PIN, "0\n");

        let mut line = SysfsLine::new(root.path(), LOCK_PIN);
        line.configure(Direction::Out).unwrap();
        assert!(!line.read().unwrap());

        line.write(true).unwrap();
        assert!(line.read().unwrap());

        let direction = fs::read_to_string(root.path().join("gpio20/direction")).unwrap();
        assert_eq!(direction, "out");
    }

    #[test]
    fn test_sysfs_exports_missing_line() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("export"), "").unwrap();

        let mut line = SysfsLine::new(root.path(), AUX_PIN);
        // The export write lands, but no kernel creates the directory.
        let err = line.configure(Direction::Out).unwrap_err();
        assert!(matches!(err, GpioError::Io { pin: AUX_PIN, .. }));
        assert_eq!(fs::read_to_string(root.path().join("export")).unwrap(), "12");
    }

    #[test]
    fn test_sysfs_rejects_garbage_value() {
        let root = tempfile::tempdir().unwrap();
        fake_sysfs(root.path(), QUIT_SWITCH_PIN, "x");

        let mut line = SysfsLine::new(root.path(), QUIT_SWITCH_PIN);
        assert!(matches!(line.read(), Err(GpioError::InvalidValue { .. })));
    }

    #[test]
    fn test_memory_line_script_then_level() {
        let mut line = MemoryLine::new(true);
        line.script([false, false]);

        assert!(!line.read().unwrap());
        assert!(!line.read().unwrap());
        assert!(line.read().unwrap());
        assert_eq!(line.read_count(), 3);
    }

    #[test]
    fn test_memory_line_shares_state_across_clones() {
        let handle = MemoryLine::new(false);
        let mut owned = handle.clone();
        owned.write(true).unwrap();
        owned.write(false).unwrap();

        assert_eq!(handle.writes(), vec![true, false]);
        assert!(!handle.level());
    }

    #[test]
    fn test_access_lines_configure_and_polarity() {
        let mut lines = AccessLines {
            lock: MemoryLine::new(false),
            indicator: MemoryLine::new(false),
            door_sensor: MemoryLine::new(true),
            quit_switch: MemoryLine::new(true),
            enroll_switch: MemoryLine::new(false),
            aux: MemoryLine::new(false),
        };
        lines.configure().unwrap();

        assert_eq!(lines.lock.direction(), Some(Direction::Out));
        assert_eq!(lines.quit_switch.direction(), Some(Direction::In));
        assert_eq!(lines.aux.writes(), vec![true]);

        assert!(!lines.quit_requested().unwrap());
        assert!(lines.enroll_requested().unwrap());
        assert!(lines.door_open().unwrap());
    }

    #[test]
    fn test_sysfs_pin_assignment() {
        let lines = AccessLines::sysfs(SYSFS_GPIO_ROOT);
        assert_eq!(lines.lock.pin(), 20);
        assert_eq!(lines.indicator.pin(), 32);
        assert_eq!(lines.door_sensor.pin(), 26);
        assert_eq!(lines.quit_switch.pin(), 18);
        assert_eq!(lines.enroll_switch.pin(), 16);
        assert_eq!(lines.aux.pin(), 12);
    }
}
