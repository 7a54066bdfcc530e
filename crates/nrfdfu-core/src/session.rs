//! DFU Session - wires a serial port, GPIO lines and a polling event loop
//! around the machine and runs one session to completion.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::control::SysfsGpioLines;
use crate::events::{DfuObserver, TracingObserver};
use crate::image::ImageDescriptor;
use crate::protocol::constants::DEFAULT_BAUD_RATE;
use crate::reactor::PollReactor;
use crate::state::{DfuMachine, DfuStatus, TimingConfig};
use crate::transport::SerialTransport;

/// Configuration for a DFU session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial device of the target's DFU UART.
    pub port: String,
    pub baud_rate: u32,
    pub hardware_flow_control: bool,
    /// Sysfs `value` file of the RESET line.
    pub reset_gpio: PathBuf,
    /// Sysfs `value` file of the DFU_MODE line.
    pub dfu_gpio: PathBuf,
    /// Directory image paths are relative to.
    pub asset_root: PathBuf,
    pub timing: TimingConfig,
    /// Images in programming order.
    pub images: Vec<ImageDescriptor>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            hardware_flow_control: true,
            reset_gpio: PathBuf::from("/sys/class/gpio/gpio20/value"),
            dfu_gpio: PathBuf::from("/sys/class/gpio/gpio21/value"),
            asset_root: PathBuf::from("."),
            timing: TimingConfig::default(),
            images: Vec::new(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// DFU Session - runs one programming session against real hardware.
pub struct DfuSession<O: DfuObserver> {
    config: SessionConfig,
    observer: Arc<O>,
}

impl DfuSession<TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: DfuObserver + 'static> DfuSession<O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: SessionConfig, observer: Arc<O>) -> Self {
        Self { config, observer }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Program every configured image, blocking until the machine finishes.
    #[instrument(skip(self), fields(port = %self.config.port))]
    pub fn run(&mut self) -> Result<()> {
        let config = &self.config;
        let transport = SerialTransport::open(
            &config.port,
            config.baud_rate,
            config.hardware_flow_control,
        )?;
        let lines = SysfsGpioLines::new(&config.reset_gpio, &config.dfu_gpio);
        let mut reactor = PollReactor::new(config.timing.poll_tick());

        let mut machine = DfuMachine::new(
            transport,
            lines,
            self.observer.clone(),
            config.timing,
            &config.asset_root,
        );

        let outcome = Arc::new(Mutex::new(None));
        let sink = outcome.clone();
        info!(images = config.images.len(), "Programming");
        machine.program(
            config.images.clone(),
            move |status| {
                *sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(status);
            },
            &mut reactor,
        );

        while machine.is_running() {
            if let Some(event) = reactor.next_event(machine.transport_mut())? {
                machine.handle_event(event, &mut reactor);
            }
        }

        let status = *outcome.lock().unwrap_or_else(|e| e.into_inner());
        match status {
            Some(DfuStatus::Success) => Ok(()),
            Some(DfuStatus::Failure) => match machine.last_error() {
                Some(e) => bail!("DFU failed ({}): {}", e.kind(), e),
                None => bail!("DFU failed"),
            },
            None => Err(anyhow!("DFU session ended without a result")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::FirmwareType;
    use tempfile::TempDir;

    #[test]
    fn test_config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.toml");

        let mut config = SessionConfig::default();
        config.port = "/dev/ttyACM1".to_string();
        config.timing.request_timeout_ms = 2500;
        config.images.push(ImageDescriptor::new(
            "sd.dat",
            "sd.bin",
            FirmwareType::Softdevice,
            7,
        ));
        config.save_to_file(&path).unwrap();

        let loaded = SessionConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SessionConfig = toml::from_str(
            r#"
            port = "/dev/ttyS3"

            [[images]]
            init_packet = "app.dat"
            firmware = "app.bin"
            firmware_type = "application"
            version = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.port, "/dev/ttyS3");
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.timing, TimingConfig::default());
        assert_eq!(config.images.len(), 1);
        assert!(config.images[0].needs_update);
    }

    #[test]
    fn test_missing_port_fails() {
        let config = SessionConfig {
            port: "/dev/does-not-exist-nrfdfu".to_string(),
            ..Default::default()
        };
        assert!(DfuSession::new(config).run().is_err());
    }
}
