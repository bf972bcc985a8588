//! Supported device models and their capability records
//!
//! Every operation that needs geometry, image mode or an opcode goes through
//! [`capabilities_for`]. Matches on [`DeviceModel`] stay exhaustive.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

/// USB vendor id shared by every supported model
pub const ELGATO_VENDOR_ID: u16 = 0x0fd9;

// ── Models ─────────────────────────────────────────────────────────

/// Closed set of supported hardware variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceModel {
    Original,
    OriginalV2,
    Mk2,
    Mini,
    MiniMk2,
    Xl,
    XlV2,
    Pedal,
    Plus,
}

impl DeviceModel {
    /// Every supported model
    pub const ALL: [DeviceModel; 9] = [
        DeviceModel::Original,
        DeviceModel::Mini,
        DeviceModel::Xl,
        DeviceModel::OriginalV2,
        DeviceModel::Mk2,
        DeviceModel::Plus,
        DeviceModel::Pedal,
        DeviceModel::XlV2,
        DeviceModel::MiniMk2,
    ];

    /// Look up a model by USB product id
    pub fn from_product_id(pid: u16) -> Result<Self> {
        match pid {
            0x0060 => Ok(DeviceModel::Original),
            0x006d => Ok(DeviceModel::OriginalV2),
            0x0080 => Ok(DeviceModel::Mk2),
            0x0063 => Ok(DeviceModel::Mini),
            0x0090 => Ok(DeviceModel::MiniMk2),
            0x006c => Ok(DeviceModel::Xl),
            0x008f => Ok(DeviceModel::XlV2),
            0x0086 => Ok(DeviceModel::Pedal),
            0x0084 => Ok(DeviceModel::Plus),
            other => Err(ProtocolError::UnknownProductId(other)),
        }
    }

    /// USB product id for this model
    pub fn product_id(self) -> u16 {
        match self {
            DeviceModel::Original => 0x0060,
            DeviceModel::OriginalV2 => 0x006d,
            DeviceModel::Mk2 => 0x0080,
            DeviceModel::Mini => 0x0063,
            DeviceModel::MiniMk2 => 0x0090,
            DeviceModel::Xl => 0x006c,
            DeviceModel::XlV2 => 0x008f,
            DeviceModel::Pedal => 0x0086,
            DeviceModel::Plus => 0x0084,
        }
    }

    /// Human-readable model name
    pub fn name(self) -> &'static str {
        match self {
            DeviceModel::Original => "Stream Deck Original",
            DeviceModel::OriginalV2 => "Stream Deck Original V2",
            DeviceModel::Mk2 => "Stream Deck MK.2",
            DeviceModel::Mini => "Stream Deck Mini",
            DeviceModel::MiniMk2 => "Stream Deck Mini MK.2",
            DeviceModel::Xl => "Stream Deck XL",
            DeviceModel::XlV2 => "Stream Deck XL V2",
            DeviceModel::Pedal => "Stream Deck Pedal",
            DeviceModel::Plus => "Stream Deck +",
        }
    }

    /// Report framing family
    pub fn family(self) -> ProtocolFamily {
        match self {
            DeviceModel::Original | DeviceModel::Mini | DeviceModel::MiniMk2 => {
                ProtocolFamily::Legacy
            }
            DeviceModel::OriginalV2
            | DeviceModel::Mk2
            | DeviceModel::Xl
            | DeviceModel::XlV2
            | DeviceModel::Pedal
            | DeviceModel::Plus => ProtocolFamily::Modern,
        }
    }

    /// Capability record for this model
    pub fn capabilities(self) -> &'static CapabilityRecord {
        capabilities_for(self)
    }
}

impl std::fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Opcode and framing family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolFamily {
    /// 17-byte feature reports, 16-byte image headers
    Legacy,
    /// 32-byte feature reports, 8-byte image headers
    Modern,
}

// ── Capability record ──────────────────────────────────────────────

/// Encoded image container expected by the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Bmp,
    Jpeg,
}

/// Clockwise rotation applied before encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }
}

/// Target description handed to the image codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMode {
    pub format: PixelFormat,
    pub width: u16,
    pub height: u16,
    pub rotation: Rotation,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl ImageMode {
    /// Same encoding parameters, different resolution
    pub fn with_size(self, width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            ..self
        }
    }
}

/// Touch strip (LCD) geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchStrip {
    pub width: u16,
    pub height: u16,
    pub image: ImageMode,
}

/// HID report lengths in bytes, report id included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLengths {
    pub input: usize,
    pub image: usize,
    pub feature: usize,
}

/// Feature report opcodes and identity report locations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureOpcodes {
    pub reset: &'static [u8],
    pub brightness: &'static [u8],
    pub serial_report: u8,
    pub serial_offset: usize,
    pub firmware_report: u8,
    pub firmware_offset: usize,
}

/// Image page framing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFraming {
    pub header_len: usize,
    /// Number carried by the first page (the Original counts from 1)
    pub first_page: u16,
    /// Whether frames are zero-padded to the full report length
    pub padded: bool,
}

/// Where key states live in an input report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputReportLayout {
    /// `[report id, state x keys]`
    KeysAtOffset1,
    /// `[report id, 0x00, count lo, count hi, state x keys]`
    KeysAtOffset4,
    /// Byte 1 selects key, touch or encoder payload
    Tagged,
}

/// Immutable per-model capability record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityRecord {
    pub model: DeviceModel,
    pub rows: usize,
    pub columns: usize,
    pub key_count: usize,
    pub encoder_count: usize,
    pub touch_strip: Option<TouchStrip>,
    /// `None` when the keys carry no screen
    pub key_image: Option<ImageMode>,
    pub reports: ReportLengths,
    pub features: FeatureOpcodes,
    pub framing: ImageFraming,
    pub input_layout: InputReportLayout,
    /// The Original wires its columns right-to-left
    pub mirrored_columns: bool,
}

impl CapabilityRecord {
    pub fn has_key_display(&self) -> bool {
        self.key_image.is_some()
    }
}

const LEGACY_FEATURES: FeatureOpcodes = FeatureOpcodes {
    reset: &[0x0B, 0x63],
    brightness: &[0x05, 0x55, 0xAA, 0xD1, 0x01],
    serial_report: 0x03,
    serial_offset: 5,
    firmware_report: 0x04,
    firmware_offset: 5,
};

const MODERN_FEATURES: FeatureOpcodes = FeatureOpcodes {
    reset: &[0x03, 0x02],
    brightness: &[0x03, 0x08],
    serial_report: 0x06,
    serial_offset: 2,
    firmware_report: 0x05,
    firmware_offset: 6,
};

const LEGACY_FRAMING: ImageFraming = ImageFraming {
    header_len: 16,
    first_page: 0,
    padded: false,
};

const MODERN_FRAMING: ImageFraming = ImageFraming {
    header_len: 8,
    first_page: 0,
    padded: true,
};

const fn keys(format: PixelFormat, size: u16, rotation: Rotation, flip_h: bool, flip_v: bool) -> ImageMode {
    ImageMode {
        format,
        width: size,
        height: size,
        rotation,
        flip_horizontal: flip_h,
        flip_vertical: flip_v,
    }
}

const ORIGINAL: CapabilityRecord = CapabilityRecord {
    model: DeviceModel::Original,
    rows: 3,
    columns: 5,
    key_count: 15,
    encoder_count: 0,
    touch_strip: None,
    key_image: Some(keys(PixelFormat::Bmp, 72, Rotation::None, true, true)),
    reports: ReportLengths {
        input: 1 + 15,
        image: 8191,
        feature: 17,
    },
    features: LEGACY_FEATURES,
    framing: ImageFraming {
        first_page: 1,
        ..LEGACY_FRAMING
    },
    input_layout: InputReportLayout::KeysAtOffset1,
    mirrored_columns: true,
};

const MINI: CapabilityRecord = CapabilityRecord {
    model: DeviceModel::Mini,
    rows: 2,
    columns: 3,
    key_count: 6,
    encoder_count: 0,
    touch_strip: None,
    key_image: Some(keys(PixelFormat::Bmp, 80, Rotation::Cw90, false, true)),
    reports: ReportLengths {
        input: 1 + 6,
        image: 1024,
        feature: 17,
    },
    features: LEGACY_FEATURES,
    framing: LEGACY_FRAMING,
    input_layout: InputReportLayout::KeysAtOffset1,
    mirrored_columns: false,
};

const MINI_MK2: CapabilityRecord = CapabilityRecord {
    model: DeviceModel::MiniMk2,
    ..MINI
};

const ORIGINAL_V2: CapabilityRecord = CapabilityRecord {
    model: DeviceModel::OriginalV2,
    rows: 3,
    columns: 5,
    key_count: 15,
    encoder_count: 0,
    touch_strip: None,
    key_image: Some(keys(PixelFormat::Jpeg, 72, Rotation::None, true, true)),
    reports: ReportLengths {
        input: 4 + 15,
        image: 1024,
        feature: 32,
    },
    features: MODERN_FEATURES,
    framing: MODERN_FRAMING,
    input_layout: InputReportLayout::KeysAtOffset4,
    mirrored_columns: false,
};

const MK2: CapabilityRecord = CapabilityRecord {
    model: DeviceModel::Mk2,
    ..ORIGINAL_V2
};

const XL: CapabilityRecord = CapabilityRecord {
    model: DeviceModel::Xl,
    rows: 4,
    columns: 8,
    key_count: 32,
    encoder_count: 0,
    touch_strip: None,
    key_image: Some(keys(PixelFormat::Jpeg, 96, Rotation::None, true, true)),
    reports: ReportLengths {
        input: 4 + 32,
        image: 1024,
        feature: 32,
    },
    features: MODERN_FEATURES,
    framing: MODERN_FRAMING,
    input_layout: InputReportLayout::KeysAtOffset4,
    mirrored_columns: false,
};

const XL_V2: CapabilityRecord = CapabilityRecord {
    model: DeviceModel::XlV2,
    ..XL
};

const PEDAL: CapabilityRecord = CapabilityRecord {
    model: DeviceModel::Pedal,
    rows: 1,
    columns: 3,
    key_count: 3,
    encoder_count: 0,
    touch_strip: None,
    key_image: None,
    reports: ReportLengths {
        input: 4 + 3,
        image: 1024,
        feature: 32,
    },
    features: MODERN_FEATURES,
    framing: MODERN_FRAMING,
    input_layout: InputReportLayout::KeysAtOffset4,
    mirrored_columns: false,
};

const PLUS: CapabilityRecord = CapabilityRecord {
    model: DeviceModel::Plus,
    rows: 2,
    columns: 4,
    key_count: 8,
    encoder_count: 4,
    touch_strip: Some(TouchStrip {
        width: 800,
        height: 100,
        image: ImageMode {
            format: PixelFormat::Jpeg,
            width: 800,
            height: 100,
            rotation: Rotation::None,
            flip_horizontal: false,
            flip_vertical: false,
        },
    }),
    key_image: Some(keys(PixelFormat::Jpeg, 120, Rotation::None, false, false)),
    reports: ReportLengths {
        input: 14,
        image: 1024,
        feature: 32,
    },
    features: MODERN_FEATURES,
    framing: MODERN_FRAMING,
    input_layout: InputReportLayout::Tagged,
    mirrored_columns: false,
};

/// Capability record lookup
pub fn capabilities_for(model: DeviceModel) -> &'static CapabilityRecord {
    match model {
        DeviceModel::Original => &ORIGINAL,
        DeviceModel::OriginalV2 => &ORIGINAL_V2,
        DeviceModel::Mk2 => &MK2,
        DeviceModel::Mini => &MINI,
        DeviceModel::MiniMk2 => &MINI_MK2,
        DeviceModel::Xl => &XL,
        DeviceModel::XlV2 => &XL_V2,
        DeviceModel::Pedal => &PEDAL,
        DeviceModel::Plus => &PLUS,
    }
}
