//! Input report decoding
//!
//! Input reports always start with report id `0x01`. Where the key states
//! sit depends on [`InputReportLayout`]; the tagged layout (Stream Deck +)
//! additionally carries touch and encoder payloads selected by byte 1.

use crate::codec::wire_key_index;
use crate::error::{ProtocolError, Result};
use crate::model::{capabilities_for, CapabilityRecord, DeviceModel, InputReportLayout};

/// Report id of every input report
pub const INPUT_REPORT_ID: u8 = 0x01;

const SUBTYPE_KEYS: u8 = 0x00;
const SUBTYPE_TOUCH: u8 = 0x02;
const SUBTYPE_ENCODER: u8 = 0x03;

const TOUCH_PRESS: u8 = 0x01;
const TOUCH_LONG_PRESS: u8 = 0x02;
const TOUCH_SWIPE: u8 = 0x03;

const ENCODER_STATE: u8 = 0x00;
const ENCODER_TWIST: u8 = 0x01;

const TAGGED_HEADER_LEN: usize = 4;
const TOUCH_REPORT_LEN: usize = 14;
const ENCODER_VALUES_OFFSET: usize = 5;

/// One decoded input report.
///
/// Key and encoder indices are logical; wire remapping has been undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInputReport {
    ButtonStates(Vec<bool>),
    EncoderStates(Vec<bool>),
    /// Signed relative motion per encoder, zero when untouched
    EncoderTwist(Vec<i8>),
    TouchPress { x: u16, y: u16 },
    TouchLongPress { x: u16, y: u16 },
    TouchSwipe {
        start_x: u16,
        start_y: u16,
        end_x: u16,
        end_y: u16,
    },
}

fn require(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() < expected {
        return Err(ProtocolError::ReportTooShort {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn le16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn key_states(model: DeviceModel, caps: &CapabilityRecord, states: &[u8]) -> Vec<bool> {
    (0..caps.key_count)
        .map(|key| states[wire_key_index(model, key)] != 0)
        .collect()
}

/// Decode one input report read from the device.
///
/// An unrecognized sub-type or event kind is a protocol violation, never an
/// empty result.
pub fn decode_input_report(model: DeviceModel, bytes: &[u8]) -> Result<RawInputReport> {
    let caps = capabilities_for(model);
    require(bytes, 1)?;
    if bytes[0] != INPUT_REPORT_ID {
        return Err(ProtocolError::UnknownReportType(bytes[0]));
    }

    match caps.input_layout {
        InputReportLayout::KeysAtOffset1 => {
            require(bytes, 1 + caps.key_count)?;
            Ok(RawInputReport::ButtonStates(key_states(model, caps, &bytes[1..])))
        }
        InputReportLayout::KeysAtOffset4 => {
            require(bytes, TAGGED_HEADER_LEN + caps.key_count)?;
            if bytes[1] != SUBTYPE_KEYS {
                return Err(ProtocolError::UnknownReportType(bytes[1]));
            }
            Ok(RawInputReport::ButtonStates(key_states(
                model,
                caps,
                &bytes[TAGGED_HEADER_LEN..],
            )))
        }
        InputReportLayout::Tagged => {
            require(bytes, 2)?;
            match bytes[1] {
                SUBTYPE_KEYS => {
                    require(bytes, TAGGED_HEADER_LEN + caps.key_count)?;
                    Ok(RawInputReport::ButtonStates(key_states(
                        model,
                        caps,
                        &bytes[TAGGED_HEADER_LEN..],
                    )))
                }
                SUBTYPE_TOUCH => decode_touch(bytes),
                SUBTYPE_ENCODER => decode_encoder(caps, bytes),
                other => Err(ProtocolError::UnknownReportType(other)),
            }
        }
    }
}

fn decode_touch(bytes: &[u8]) -> Result<RawInputReport> {
    require(bytes, TOUCH_REPORT_LEN)?;
    let (x, y) = (le16(bytes, 6), le16(bytes, 8));
    match bytes[4] {
        TOUCH_PRESS => Ok(RawInputReport::TouchPress { x, y }),
        TOUCH_LONG_PRESS => Ok(RawInputReport::TouchLongPress { x, y }),
        TOUCH_SWIPE => Ok(RawInputReport::TouchSwipe {
            start_x: x,
            start_y: y,
            end_x: le16(bytes, 10),
            end_y: le16(bytes, 12),
        }),
        other => Err(ProtocolError::UnknownTouchEvent(other)),
    }
}

fn decode_encoder(caps: &CapabilityRecord, bytes: &[u8]) -> Result<RawInputReport> {
    require(bytes, ENCODER_VALUES_OFFSET + caps.encoder_count)?;
    let values = &bytes[ENCODER_VALUES_OFFSET..ENCODER_VALUES_OFFSET + caps.encoder_count];
    match bytes[4] {
        ENCODER_STATE => Ok(RawInputReport::EncoderStates(
            values.iter().map(|&b| b != 0).collect(),
        )),
        ENCODER_TWIST => Ok(RawInputReport::EncoderTwist(
            values.iter().map(|&b| b as i8).collect(),
        )),
        other => Err(ProtocolError::UnknownEncoderEvent(other)),
    }
}

/// Build the input report the device would send for `report`.
///
/// Exact inverse of [`decode_input_report`]; used by the mock transport and
/// by tests. The result is zero-padded to the model's input report length.
pub fn encode_input_report(model: DeviceModel, report: &RawInputReport) -> Result<Vec<u8>> {
    let caps = capabilities_for(model);
    let mut bytes = vec![0u8; caps.reports.input.max(TAGGED_HEADER_LEN)];
    bytes[0] = INPUT_REPORT_ID;

    match report {
        RawInputReport::ButtonStates(states) => {
            check_len(model, caps.key_count, states.len())?;
            let offset = match caps.input_layout {
                InputReportLayout::KeysAtOffset1 => 1,
                InputReportLayout::KeysAtOffset4 | InputReportLayout::Tagged => {
                    bytes[1] = SUBTYPE_KEYS;
                    bytes[2..4].copy_from_slice(&(caps.key_count as u16).to_le_bytes());
                    TAGGED_HEADER_LEN
                }
            };
            bytes.resize(bytes.len().max(offset + caps.key_count), 0);
            for (key, &pressed) in states.iter().enumerate() {
                bytes[offset + wire_key_index(model, key)] = u8::from(pressed);
            }
        }
        RawInputReport::EncoderStates(states) => {
            let values: Vec<u8> = states.iter().map(|&s| u8::from(s)).collect();
            encode_encoder(model, caps, &mut bytes, ENCODER_STATE, &values)?;
        }
        RawInputReport::EncoderTwist(deltas) => {
            let values: Vec<u8> = deltas.iter().map(|&d| d as u8).collect();
            encode_encoder(model, caps, &mut bytes, ENCODER_TWIST, &values)?;
        }
        RawInputReport::TouchPress { x, y } => {
            encode_touch(model, caps, &mut bytes, TOUCH_PRESS, [*x, *y, 0, 0])?;
        }
        RawInputReport::TouchLongPress { x, y } => {
            encode_touch(model, caps, &mut bytes, TOUCH_LONG_PRESS, [*x, *y, 0, 0])?;
        }
        RawInputReport::TouchSwipe {
            start_x,
            start_y,
            end_x,
            end_y,
        } => {
            encode_touch(
                model,
                caps,
                &mut bytes,
                TOUCH_SWIPE,
                [*start_x, *start_y, *end_x, *end_y],
            )?;
        }
    }
    Ok(bytes)
}

fn check_len(model: DeviceModel, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ProtocolError::LengthMismatch {
            model,
            expected,
            actual,
        });
    }
    Ok(())
}

fn encode_encoder(
    model: DeviceModel,
    caps: &CapabilityRecord,
    bytes: &mut Vec<u8>,
    kind: u8,
    values: &[u8],
) -> Result<()> {
    if caps.encoder_count == 0 || caps.input_layout != InputReportLayout::Tagged {
        return Err(ProtocolError::UnsupportedReport {
            model,
            kind: "encoder",
        });
    }
    check_len(model, caps.encoder_count, values.len())?;
    bytes.resize(bytes.len().max(ENCODER_VALUES_OFFSET + values.len()), 0);
    bytes[1] = SUBTYPE_ENCODER;
    bytes[2..4].copy_from_slice(&(values.len() as u16).to_le_bytes());
    bytes[4] = kind;
    bytes[ENCODER_VALUES_OFFSET..ENCODER_VALUES_OFFSET + values.len()].copy_from_slice(values);
    Ok(())
}

fn encode_touch(
    model: DeviceModel,
    caps: &CapabilityRecord,
    bytes: &mut Vec<u8>,
    kind: u8,
    coords: [u16; 4],
) -> Result<()> {
    if caps.touch_strip.is_none() || caps.input_layout != InputReportLayout::Tagged {
        return Err(ProtocolError::UnsupportedReport {
            model,
            kind: "touch",
        });
    }
    bytes.resize(bytes.len().max(TOUCH_REPORT_LEN), 0);
    bytes[1] = SUBTYPE_TOUCH;
    bytes[2..4].copy_from_slice(&(TOUCH_REPORT_LEN as u16).to_le_bytes());
    bytes[4] = kind;
    for (i, value) in coords.iter().enumerate() {
        let at = 6 + i * 2;
        bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_legacy_buttons() {
        let mut bytes = vec![0u8; 7];
        bytes[0] = 0x01;
        bytes[1 + 2] = 1;
        let report = decode_input_report(DeviceModel::Mini, &bytes).unwrap();
        assert_eq!(
            report,
            RawInputReport::ButtonStates(vec![false, false, true, false, false, false])
        );
    }

    #[test]
    fn test_decode_original_undoes_column_flip() {
        let mut bytes = vec![0u8; 16];
        bytes[0] = 0x01;
        // wire key 9 is logical key 5
        bytes[1 + 9] = 1;
        let RawInputReport::ButtonStates(states) =
            decode_input_report(DeviceModel::Original, &bytes).unwrap()
        else {
            panic!("expected button states");
        };
        assert!(states[5]);
        assert_eq!(states.iter().filter(|&&s| s).count(), 1);
    }

    #[test]
    fn test_decode_modern_buttons() {
        let mut bytes = vec![0u8; 4 + 32];
        bytes[0] = 0x01;
        bytes[2] = 32;
        bytes[4 + 31] = 1;
        let RawInputReport::ButtonStates(states) =
            decode_input_report(DeviceModel::Xl, &bytes).unwrap()
        else {
            panic!("expected button states");
        };
        assert_eq!(states.len(), 32);
        assert!(states[31]);
    }

    #[test]
    fn test_decode_short_report() {
        let bytes = [0x01, 0x00, 0x0f];
        assert_eq!(
            decode_input_report(DeviceModel::Mk2, &bytes),
            Err(ProtocolError::ReportTooShort {
                expected: 19,
                actual: 3
            })
        );
    }

    #[test]
    fn test_decode_plus_twist_is_signed() {
        let bytes = [0x01, 0x03, 0x05, 0x00, 0x01, 0x01, 0xFF, 0x00, 0xFE, 0, 0, 0, 0, 0];
        assert_eq!(
            decode_input_report(DeviceModel::Plus, &bytes),
            Ok(RawInputReport::EncoderTwist(vec![1, -1, 0, -2]))
        );
    }

    #[test]
    fn test_decode_plus_swipe() {
        let mut bytes = [0u8; 14];
        bytes[..5].copy_from_slice(&[0x01, 0x02, 0x0e, 0x00, 0x03]);
        bytes[6..8].copy_from_slice(&100u16.to_le_bytes());
        bytes[8..10].copy_from_slice(&50u16.to_le_bytes());
        bytes[10..12].copy_from_slice(&700u16.to_le_bytes());
        bytes[12..14].copy_from_slice(&40u16.to_le_bytes());
        assert_eq!(
            decode_input_report(DeviceModel::Plus, &bytes),
            Ok(RawInputReport::TouchSwipe {
                start_x: 100,
                start_y: 50,
                end_x: 700,
                end_y: 40
            })
        );
    }

    #[test]
    fn test_unknown_subtype_is_a_violation() {
        let bytes = [0x01, 0x07, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            decode_input_report(DeviceModel::Plus, &bytes),
            Err(ProtocolError::UnknownReportType(0x07))
        );
    }

    #[test]
    fn test_unknown_touch_and_encoder_kinds() {
        let touch = [0x01, 0x02, 0x0e, 0, 0x09, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            decode_input_report(DeviceModel::Plus, &touch),
            Err(ProtocolError::UnknownTouchEvent(0x09))
        );
        let encoder = [0x01, 0x03, 0x05, 0, 0x04, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            decode_input_report(DeviceModel::Plus, &encoder),
            Err(ProtocolError::UnknownEncoderEvent(0x04))
        );
    }

    #[test]
    fn test_encode_rejects_unsupported_reports() {
        assert_eq!(
            encode_input_report(DeviceModel::Mk2, &RawInputReport::EncoderTwist(vec![1])),
            Err(ProtocolError::UnsupportedReport {
                model: DeviceModel::Mk2,
                kind: "encoder"
            })
        );
        assert!(matches!(
            encode_input_report(DeviceModel::Mini, &RawInputReport::ButtonStates(vec![true])),
            Err(ProtocolError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_encode_pads_to_report_length() {
        let bytes = encode_input_report(
            DeviceModel::Plus,
            &RawInputReport::EncoderStates(vec![true, false, false, true]),
        )
        .unwrap();
        assert_eq!(bytes.len(), 14);
        assert_eq!(&bytes[..9], &[0x01, 0x03, 0x04, 0x00, 0x00, 1, 0, 0, 1]);
    }
}
