//! Protocol violations raised by the codec

use crate::model::DeviceModel;
use thiserror::Error;

/// Errors raised while building or parsing reports.
///
/// Every variant is a protocol violation: fatal for the operation that hit
/// it and never to be confused with "no data available".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unrecognized product id 0x{0:04x}")]
    UnknownProductId(u16),

    #[error("report too short: expected at least {expected} bytes, got {actual}")]
    ReportTooShort { expected: usize, actual: usize },

    #[error("unrecognized input report sub-type 0x{0:02x}")]
    UnknownReportType(u8),

    #[error("unrecognized touch event kind 0x{0:02x}")]
    UnknownTouchEvent(u8),

    #[error("unrecognized encoder event kind 0x{0:02x}")]
    UnknownEncoderEvent(u8),

    #[error("key index {key} out of range for {model} ({count} keys)")]
    KeyOutOfRange {
        model: DeviceModel,
        key: usize,
        count: usize,
    },

    #[error("{0} has no key display")]
    NoDisplay(DeviceModel),

    #[error("{0} has no touch strip")]
    NoTouchStrip(DeviceModel),

    #[error("region {x},{y} {width}x{height} exceeds the touch strip")]
    RegionOutOfBounds {
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    },

    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    #[error("{model} cannot produce {kind} reports")]
    UnsupportedReport {
        model: DeviceModel,
        kind: &'static str,
    },

    #[error("report carries {actual} entries, {model} expects {expected}")]
    LengthMismatch {
        model: DeviceModel,
        expected: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
