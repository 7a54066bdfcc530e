//! Image descriptors: what to program and in which order.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Firmware type as reported by the bootloader's `FirmwareVersion` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirmwareType {
    Softdevice,
    Application,
}

impl FirmwareType {
    pub const fn as_u8(self) -> u8 {
        match self {
            FirmwareType::Softdevice => 0x00,
            FirmwareType::Application => 0x01,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(FirmwareType::Softdevice),
            0x01 => Some(FirmwareType::Application),
            _ => None,
        }
    }
}

impl fmt::Display for FirmwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareType::Softdevice => write!(f, "softdevice"),
            FirmwareType::Application => write!(f, "application"),
        }
    }
}

fn default_needs_update() -> bool {
    true
}

/// One image: a signed init packet plus the firmware it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// Init packet (command object) file, relative to the asset root.
    pub init_packet: PathBuf,
    /// Firmware (data object) file, relative to the asset root.
    pub firmware: PathBuf,
    pub firmware_type: FirmwareType,
    pub version: u32,

    /// Cleared when the device already runs this exact type and version.
    #[serde(skip, default = "default_needs_update")]
    pub needs_update: bool,

    /// Version the device reported for this firmware type, if any.
    #[serde(skip)]
    pub installed_version: Option<u32>,
}

impl ImageDescriptor {
    pub fn new(
        init_packet: impl Into<PathBuf>,
        firmware: impl Into<PathBuf>,
        firmware_type: FirmwareType,
        version: u32,
    ) -> Self {
        Self {
            init_packet: init_packet.into(),
            firmware: firmware.into(),
            firmware_type,
            version,
            needs_update: true,
            installed_version: None,
        }
    }

    /// Whether the device reported exactly this image.
    pub fn matches(&self, image_type: u8, version: u32) -> bool {
        self.firmware_type.as_u8() == image_type && self.version == version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firmware_type_codes() {
        assert_eq!(FirmwareType::from_u8(0x00), Some(FirmwareType::Softdevice));
        assert_eq!(FirmwareType::from_u8(0x01), Some(FirmwareType::Application));
        assert_eq!(FirmwareType::from_u8(0x02), None);
    }

    #[test]
    fn test_matches_type_and_version() {
        let image = ImageDescriptor::new("app.dat", "app.bin", FirmwareType::Application, 7);
        assert!(image.matches(0x01, 7));
        assert!(!image.matches(0x01, 8));
        assert!(!image.matches(0x00, 7));
    }

    #[test]
    fn test_deserialized_image_needs_update() {
        let image: ImageDescriptor = toml::from_str(
            r#"
            init_packet = "sd.dat"
            firmware = "sd.bin"
            firmware_type = "softdevice"
            version = 6001000
            "#,
        )
        .unwrap();
        assert!(image.needs_update);
        assert_eq!(image.installed_version, None);
        assert_eq!(image.firmware_type, FirmwareType::Softdevice);
    }
}
