//! Capability table and binary report codec for Stream Deck hardware.
//!
//! This crate is intentionally lightweight (only `serde` + `thiserror`).
//! It knows nothing about threads, handles or transports, only bytes:
//! - `model`: the closed set of supported models and their capability records
//! - `codec`: feature reports (reset, brightness, identity) and chunked image frames
//! - `input`: decoding (and re-encoding) of polled input reports

pub mod codec;
pub mod error;
pub mod input;
pub mod model;

pub use codec::{
    build_brightness_report, build_reset_report, decode_button_image, decode_lcd_region,
    encode_button_image, encode_lcd_region, identity_request, parse_identity_string,
    parse_image_frame, parse_lcd_frame, wire_key_index, FrameHeader, FramePager, IdentityKind,
    LcdFrameHeader, Region,
};
pub use error::{ProtocolError, Result};
pub use input::{decode_input_report, encode_input_report, RawInputReport};
pub use model::{
    capabilities_for, CapabilityRecord, DeviceModel, FeatureOpcodes, ImageFraming, ImageMode,
    InputReportLayout, PixelFormat, ProtocolFamily, ReportLengths, Rotation, TouchStrip,
    ELGATO_VENDOR_ID,
};
