//! Feature reports and chunked image frames
//!
//! Image payloads larger than one report are split into page-numbered
//! frames, the last one flagged explicitly:
//! - Legacy key frames: 16-byte header `[0x02, 0x01, page, 0x00, last, key+1, 0 x 10]`,
//!   sent unpadded so the frame length carries the chunk length
//! - Modern key frames: 8-byte header `[0x02, 0x07, key, last, len_lo, len_hi, page_lo, page_hi]`,
//!   padded to the report length
//! - Touch strip frames: 16-byte header carrying the target region, last flag,
//!   page and chunk length, padded to the report length

use crate::error::{ProtocolError, Result};
use crate::model::{capabilities_for, CapabilityRecord, DeviceModel, ProtocolFamily};

/// Report id used by every image output report
pub const IMAGE_REPORT_ID: u8 = 0x02;

/// Legacy key image command byte
pub const LEGACY_IMAGE_COMMAND: u8 = 0x01;

/// Modern key image command byte
pub const MODERN_IMAGE_COMMAND: u8 = 0x07;

/// Touch strip image command byte
pub const LCD_IMAGE_COMMAND: u8 = 0x0c;

/// Touch strip frame header length
pub const LCD_HEADER_LEN: usize = 16;

// ── Feature reports ────────────────────────────────────────────────

/// Build the feature report that resets the device to its boot logo
pub fn build_reset_report(model: DeviceModel) -> Vec<u8> {
    let caps = capabilities_for(model);
    feature_report(caps, caps.features.reset)
}

/// Build the feature report that sets backlight brightness (0-100 %)
pub fn build_brightness_report(model: DeviceModel, percent: u8) -> Result<Vec<u8>> {
    let caps = capabilities_for(model);
    if !caps.has_key_display() {
        return Err(ProtocolError::NoDisplay(model));
    }
    let mut report = feature_report(caps, caps.features.brightness);
    report[caps.features.brightness.len()] = percent.min(100);
    Ok(report)
}

fn feature_report(caps: &CapabilityRecord, opcode: &[u8]) -> Vec<u8> {
    let mut report = vec![0u8; caps.reports.feature];
    report[..opcode.len()].copy_from_slice(opcode);
    report
}

/// Identity strings exposed through feature reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Serial,
    Firmware,
}

/// Report id and buffer length for an identity feature report request
pub fn identity_request(model: DeviceModel, kind: IdentityKind) -> (u8, usize) {
    let caps = capabilities_for(model);
    let report_id = match kind {
        IdentityKind::Serial => caps.features.serial_report,
        IdentityKind::Firmware => caps.features.firmware_report,
    };
    (report_id, caps.reports.feature)
}

/// Extract the ASCII string carried by an identity feature report
pub fn parse_identity_string(model: DeviceModel, kind: IdentityKind, report: &[u8]) -> String {
    let caps = capabilities_for(model);
    let offset = match kind {
        IdentityKind::Serial => caps.features.serial_offset,
        IdentityKind::Firmware => caps.features.firmware_offset,
    };
    report
        .get(offset..)
        .unwrap_or(&[])
        .iter()
        .take_while(|&&b| b != 0x00 && b != 0xFF)
        .filter(|b| b.is_ascii_graphic() || **b == b' ')
        .map(|&b| b as char)
        .collect::<String>()
        .trim()
        .to_string()
}

// ── Key index remapping ────────────────────────────────────────────

/// Translate between logical and wire key indices.
///
/// Only models with mirrored columns remap (`col -> columns-1-col`). The
/// mapping is its own inverse, so the same function serves writes and reads.
pub fn wire_key_index(model: DeviceModel, key: usize) -> usize {
    let caps = capabilities_for(model);
    if !caps.mirrored_columns {
        return key;
    }
    let col = key % caps.columns;
    key - col + (caps.columns - 1 - col)
}

// ── Image frames ───────────────────────────────────────────────────

/// Rectangle on the touch strip, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Region {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameTarget {
    Key { wire_key: u8 },
    Lcd(Region),
}

/// Splits one payload into image frames.
///
/// `next_into` writes each frame into a caller-owned buffer so a device can
/// reuse one allocation for every write. The `Iterator` impl allocates a
/// fresh `Vec` per frame.
#[derive(Debug, Clone)]
pub struct FramePager<'a> {
    caps: &'static CapabilityRecord,
    target: FrameTarget,
    data: &'a [u8],
    offset: usize,
    page: u16,
    finished: bool,
}

impl<'a> FramePager<'a> {
    /// Pager for a key image; `key` is the logical key index
    pub fn for_key(model: DeviceModel, key: usize, data: &'a [u8]) -> Result<Self> {
        let caps = capabilities_for(model);
        if !caps.has_key_display() {
            return Err(ProtocolError::NoDisplay(model));
        }
        if key >= caps.key_count {
            return Err(ProtocolError::KeyOutOfRange {
                model,
                key,
                count: caps.key_count,
            });
        }
        let wire_key = wire_key_index(model, key) as u8;
        Self::new(caps, FrameTarget::Key { wire_key }, data)
    }

    /// Pager for a touch strip region
    pub fn for_lcd(model: DeviceModel, region: Region, data: &'a [u8]) -> Result<Self> {
        let caps = capabilities_for(model);
        let strip = caps.touch_strip.ok_or(ProtocolError::NoTouchStrip(model))?;
        let fits = region.width > 0
            && region.height > 0
            && u32::from(region.x) + u32::from(region.width) <= u32::from(strip.width)
            && u32::from(region.y) + u32::from(region.height) <= u32::from(strip.height);
        if !fits {
            return Err(ProtocolError::RegionOutOfBounds {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
            });
        }
        Self::new(caps, FrameTarget::Lcd(region), data)
    }

    fn new(caps: &'static CapabilityRecord, target: FrameTarget, data: &'a [u8]) -> Result<Self> {
        let pager = Self {
            caps,
            target,
            data,
            offset: 0,
            page: 0,
            finished: false,
        };
        let last_page = pager.first_page() as usize + pager.frame_count() - 1;
        if last_page > pager.max_page() {
            return Err(ProtocolError::MalformedFrame("payload exceeds page numbering"));
        }
        Ok(pager)
    }

    fn is_legacy_key(&self) -> bool {
        matches!(self.target, FrameTarget::Key { .. })
            && self.caps.model.family() == ProtocolFamily::Legacy
    }

    fn first_page(&self) -> u16 {
        match self.target {
            FrameTarget::Key { .. } => self.caps.framing.first_page,
            FrameTarget::Lcd(_) => 0,
        }
    }

    fn max_page(&self) -> usize {
        if self.is_legacy_key() {
            u8::MAX as usize
        } else {
            u16::MAX as usize
        }
    }

    /// Header length for this target
    pub fn header_len(&self) -> usize {
        match self.target {
            FrameTarget::Key { .. } => self.caps.framing.header_len,
            FrameTarget::Lcd(_) => LCD_HEADER_LEN,
        }
    }

    /// Payload bytes carried by a full frame
    pub fn chunk_capacity(&self) -> usize {
        self.caps.reports.image - self.header_len()
    }

    /// Total frames this payload needs (an empty payload still needs one)
    pub fn frame_count(&self) -> usize {
        self.data.len().div_ceil(self.chunk_capacity()).max(1)
    }

    fn padded(&self) -> bool {
        match self.target {
            FrameTarget::Key { .. } => self.caps.framing.padded,
            FrameTarget::Lcd(_) => true,
        }
    }

    /// Write the next frame into `buf`, returning `false` once every frame is out
    pub fn next_into(&mut self, buf: &mut Vec<u8>) -> bool {
        if self.finished {
            return false;
        }

        let remaining = self.data.len() - self.offset;
        let len = remaining.min(self.chunk_capacity());
        let is_last = len == remaining;

        buf.clear();
        self.write_header(buf, len, is_last);
        buf.extend_from_slice(&self.data[self.offset..self.offset + len]);
        if self.padded() {
            buf.resize(self.caps.reports.image, 0);
        }

        self.offset += len;
        self.page += 1;
        self.finished = is_last;
        true
    }

    fn write_header(&self, buf: &mut Vec<u8>, len: usize, is_last: bool) {
        let page = self.first_page() + self.page;
        let len = len as u16;
        match self.target {
            FrameTarget::Key { wire_key } => match self.caps.model.family() {
                ProtocolFamily::Legacy => {
                    buf.extend_from_slice(&[
                        IMAGE_REPORT_ID,
                        LEGACY_IMAGE_COMMAND,
                        page as u8,
                        0x00,
                        u8::from(is_last),
                        wire_key + 1,
                    ]);
                    buf.resize(self.header_len(), 0);
                }
                ProtocolFamily::Modern => {
                    buf.extend_from_slice(&[
                        IMAGE_REPORT_ID,
                        MODERN_IMAGE_COMMAND,
                        wire_key,
                        u8::from(is_last),
                    ]);
                    buf.extend_from_slice(&len.to_le_bytes());
                    buf.extend_from_slice(&page.to_le_bytes());
                }
            },
            FrameTarget::Lcd(region) => {
                buf.extend_from_slice(&[IMAGE_REPORT_ID, LCD_IMAGE_COMMAND]);
                buf.extend_from_slice(&region.x.to_le_bytes());
                buf.extend_from_slice(&region.y.to_le_bytes());
                buf.extend_from_slice(&region.width.to_le_bytes());
                buf.extend_from_slice(&region.height.to_le_bytes());
                buf.push(u8::from(is_last));
                buf.extend_from_slice(&page.to_le_bytes());
                buf.extend_from_slice(&len.to_le_bytes());
                buf.push(0x00);
            }
        }
    }
}

impl Iterator for FramePager<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        let mut frame = Vec::with_capacity(self.caps.reports.image);
        self.next_into(&mut frame).then_some(frame)
    }
}

/// Encode a key image into its sequence of frames
pub fn encode_button_image(model: DeviceModel, key: usize, data: &[u8]) -> Result<Vec<Vec<u8>>> {
    Ok(FramePager::for_key(model, key, data)?.collect())
}

/// Encode a touch strip region into its sequence of frames
pub fn encode_lcd_region(model: DeviceModel, region: Region, data: &[u8]) -> Result<Vec<Vec<u8>>> {
    Ok(FramePager::for_lcd(model, region, data)?.collect())
}

// ── Frame parsing ──────────────────────────────────────────────────

/// Decoded key image frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Zero-based page index
    pub page: u16,
    pub is_last: bool,
    /// Logical key index (wire remapping undone)
    pub key: usize,
    pub payload_len: usize,
}

/// Decoded touch strip frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcdFrameHeader {
    pub region: Region,
    pub page: u16,
    pub is_last: bool,
    pub payload_len: usize,
}

fn le16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

/// Parse one key image frame
pub fn parse_image_frame(model: DeviceModel, frame: &[u8]) -> Result<(FrameHeader, &[u8])> {
    let caps = capabilities_for(model);
    if !caps.has_key_display() {
        return Err(ProtocolError::NoDisplay(model));
    }
    let header_len = caps.framing.header_len;
    if frame.len() < header_len {
        return Err(ProtocolError::ReportTooShort {
            expected: header_len,
            actual: frame.len(),
        });
    }
    if frame[0] != IMAGE_REPORT_ID {
        return Err(ProtocolError::MalformedFrame("not an image report"));
    }

    let (page, is_last, wire_key, payload) = match model.family() {
        ProtocolFamily::Legacy => {
            if frame[1] != LEGACY_IMAGE_COMMAND {
                return Err(ProtocolError::MalformedFrame("unexpected image command"));
            }
            let page = u16::from(frame[2])
                .checked_sub(caps.framing.first_page)
                .ok_or(ProtocolError::MalformedFrame("page below first page"))?;
            let wire_key = frame[5]
                .checked_sub(1)
                .ok_or(ProtocolError::MalformedFrame("key index zero"))?;
            (page, frame[4] != 0, wire_key, &frame[header_len..])
        }
        ProtocolFamily::Modern => {
            if frame[1] != MODERN_IMAGE_COMMAND {
                return Err(ProtocolError::MalformedFrame("unexpected image command"));
            }
            let len = le16(frame, 4) as usize;
            if header_len + len > frame.len() {
                return Err(ProtocolError::ReportTooShort {
                    expected: header_len + len,
                    actual: frame.len(),
                });
            }
            (
                le16(frame, 6),
                frame[3] != 0,
                frame[2],
                &frame[header_len..header_len + len],
            )
        }
    };

    let wire_key = wire_key as usize;
    if wire_key >= caps.key_count {
        return Err(ProtocolError::KeyOutOfRange {
            model,
            key: wire_key,
            count: caps.key_count,
        });
    }

    let header = FrameHeader {
        page,
        is_last,
        key: wire_key_index(model, wire_key),
        payload_len: payload.len(),
    };
    Ok((header, payload))
}

/// Parse one touch strip frame
pub fn parse_lcd_frame(model: DeviceModel, frame: &[u8]) -> Result<(LcdFrameHeader, &[u8])> {
    let caps = capabilities_for(model);
    if caps.touch_strip.is_none() {
        return Err(ProtocolError::NoTouchStrip(model));
    }
    if frame.len() < LCD_HEADER_LEN {
        return Err(ProtocolError::ReportTooShort {
            expected: LCD_HEADER_LEN,
            actual: frame.len(),
        });
    }
    if frame[0] != IMAGE_REPORT_ID || frame[1] != LCD_IMAGE_COMMAND {
        return Err(ProtocolError::MalformedFrame("not a touch strip image report"));
    }
    let len = le16(frame, 13) as usize;
    if LCD_HEADER_LEN + len > frame.len() {
        return Err(ProtocolError::ReportTooShort {
            expected: LCD_HEADER_LEN + len,
            actual: frame.len(),
        });
    }
    let header = LcdFrameHeader {
        region: Region::new(le16(frame, 2), le16(frame, 4), le16(frame, 6), le16(frame, 8)),
        is_last: frame[10] != 0,
        page: le16(frame, 11),
        payload_len: len,
    };
    Ok((header, &frame[LCD_HEADER_LEN..LCD_HEADER_LEN + len]))
}

/// Reassemble a key image from its frames, returning the logical key and payload
pub fn decode_button_image<F: AsRef<[u8]>>(model: DeviceModel, frames: &[F]) -> Result<(usize, Vec<u8>)> {
    let mut key = None;
    let mut payload = Vec::new();
    reassemble(frames.len(), |i, expected_page, expect_last| {
        let (header, chunk) = parse_image_frame(model, frames[i].as_ref())?;
        check_page(header.page, header.is_last, expected_page, expect_last)?;
        match key {
            None => key = Some(header.key),
            Some(k) if k != header.key => {
                return Err(ProtocolError::MalformedFrame("key changed between pages"))
            }
            Some(_) => {}
        }
        payload.extend_from_slice(chunk);
        Ok(())
    })?;
    let key = key.ok_or(ProtocolError::MalformedFrame("no frames"))?;
    Ok((key, payload))
}

/// Reassemble a touch strip region from its frames
pub fn decode_lcd_region<F: AsRef<[u8]>>(model: DeviceModel, frames: &[F]) -> Result<(Region, Vec<u8>)> {
    let mut region = None;
    let mut payload = Vec::new();
    reassemble(frames.len(), |i, expected_page, expect_last| {
        let (header, chunk) = parse_lcd_frame(model, frames[i].as_ref())?;
        check_page(header.page, header.is_last, expected_page, expect_last)?;
        match region {
            None => region = Some(header.region),
            Some(r) if r != header.region => {
                return Err(ProtocolError::MalformedFrame("region changed between pages"))
            }
            Some(_) => {}
        }
        payload.extend_from_slice(chunk);
        Ok(())
    })?;
    let region = region.ok_or(ProtocolError::MalformedFrame("no frames"))?;
    Ok((region, payload))
}

fn reassemble(count: usize, mut step: impl FnMut(usize, u16, bool) -> Result<()>) -> Result<()> {
    if count == 0 {
        return Err(ProtocolError::MalformedFrame("no frames"));
    }
    if count > u16::MAX as usize + 1 {
        return Err(ProtocolError::MalformedFrame("payload exceeds page numbering"));
    }
    for i in 0..count {
        step(i, i as u16, i + 1 == count)?;
    }
    Ok(())
}

fn check_page(page: u16, is_last: bool, expected_page: u16, expect_last: bool) -> Result<()> {
    if page != expected_page {
        return Err(ProtocolError::MalformedFrame("pages out of sequence"));
    }
    if is_last != expect_last {
        return Err(ProtocolError::MalformedFrame("last-page flag misplaced"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_brightness_report() {
        let report = build_brightness_report(DeviceModel::Original, 50).unwrap();
        assert_eq!(
            report,
            vec![0x05, 0x55, 0xAA, 0xD1, 0x01, 50, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_modern_brightness_report() {
        let report = build_brightness_report(DeviceModel::Xl, 80).unwrap();
        assert_eq!(report.len(), 32);
        assert_eq!(&report[..3], &[0x03, 0x08, 80]);
        assert!(report[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_brightness_is_clamped() {
        let report = build_brightness_report(DeviceModel::Mk2, 250).unwrap();
        assert_eq!(report[2], 100);
    }

    #[test]
    fn test_brightness_rejected_without_display() {
        assert_eq!(
            build_brightness_report(DeviceModel::Pedal, 10),
            Err(ProtocolError::NoDisplay(DeviceModel::Pedal))
        );
    }

    #[test]
    fn test_modern_reset_report() {
        let report = build_reset_report(DeviceModel::Plus);
        assert_eq!(report.len(), 32);
        assert_eq!(&report[..2], &[0x03, 0x02]);
        assert!(report[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_legacy_reset_report() {
        for model in [DeviceModel::Original, DeviceModel::Mini, DeviceModel::MiniMk2] {
            let report = build_reset_report(model);
            assert_eq!(report.len(), 17);
            assert_eq!(&report[..2], &[0x0B, 0x63]);
        }
    }

    #[test]
    fn test_column_flip() {
        assert_eq!(wire_key_index(DeviceModel::Original, 7), 7);
        assert_eq!(wire_key_index(DeviceModel::Original, 5), 9);
        assert_eq!(wire_key_index(DeviceModel::Original, 9), 5);
        assert_eq!(wire_key_index(DeviceModel::Original, 0), 4);
        assert_eq!(wire_key_index(DeviceModel::OriginalV2, 5), 5);
    }

    #[test]
    fn test_chunked_modern_write() {
        let data = vec![0xAB; 2100];
        let frames = encode_button_image(DeviceModel::Mk2, 3, &data).unwrap();
        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.len(), 1024);
            assert_eq!(&frame[..3], &[0x02, 0x07, 3]);
            assert_eq!(frame[3] != 0, i == 2, "only the last frame is final");
            assert_eq!(le16(frame, 6), i as u16);
        }
        assert_eq!(le16(&frames[0], 4), 1016);
        assert_eq!(le16(&frames[2], 4) as usize, 2100 - 2 * 1016);
    }

    #[test]
    fn test_legacy_frames_are_unpadded() {
        let data = vec![0x11; 1500];
        let frames = encode_button_image(DeviceModel::Mini, 2, &data).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), 1024);
        assert_eq!(frames[1].len(), 16 + 1500 - 1008);
        assert_eq!(&frames[0][..6], &[0x02, 0x01, 0, 0x00, 0, 3]);
        assert_eq!(&frames[1][..6], &[0x02, 0x01, 1, 0x00, 1, 3]);
    }

    #[test]
    fn test_original_pages_start_at_one_and_remap_key() {
        let data = vec![0u8; 72 * 72 * 3 + 54];
        let frames = encode_button_image(DeviceModel::Original, 5, &data).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][2], 1);
        assert_eq!(frames[1][2], 2);
        // logical key 5 is wire key 9, carried 1-based
        assert_eq!(frames[0][5], 10);
    }

    #[test]
    fn test_empty_payload_yields_single_final_frame() {
        let frames = encode_button_image(DeviceModel::Xl, 0, &[]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][3], 1);
        assert_eq!(le16(&frames[0], 4), 0);
    }

    #[test]
    fn test_key_out_of_range() {
        let err = encode_button_image(DeviceModel::Mini, 6, &[1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::KeyOutOfRange {
                model: DeviceModel::Mini,
                key: 6,
                count: 6
            }
        );
    }

    #[test]
    fn test_next_into_reuses_buffer() {
        let data = vec![7u8; 3000];
        let mut pager = FramePager::for_key(DeviceModel::Xl, 1, &data).unwrap();
        assert_eq!(pager.frame_count(), 3);
        let mut buf = Vec::with_capacity(1024);
        let ptr = buf.as_ptr();
        let mut frames = 0;
        while pager.next_into(&mut buf) {
            assert_eq!(buf.as_ptr(), ptr);
            frames += 1;
        }
        assert_eq!(frames, 3);
        assert!(!pager.next_into(&mut buf));
    }

    #[test]
    fn test_lcd_region_header() {
        let data = vec![0x55; 1500];
        let region = Region::new(200, 0, 200, 100);
        let frames = encode_lcd_region(DeviceModel::Plus, region, &data).unwrap();
        assert_eq!(frames.len(), 2);
        let first = &frames[0];
        assert_eq!(first.len(), 1024);
        assert_eq!(&first[..2], &[0x02, 0x0c]);
        assert_eq!(le16(first, 2), 200);
        assert_eq!(le16(first, 4), 0);
        assert_eq!(le16(first, 6), 200);
        assert_eq!(le16(first, 8), 100);
        assert_eq!(first[10], 0);
        assert_eq!(le16(first, 11), 0);
        assert_eq!(le16(first, 13), 1008);
        assert_eq!(frames[1][10], 1);
        assert_eq!(le16(&frames[1], 13), 1500 - 1008);
    }

    #[test]
    fn test_lcd_rejected_without_touch_strip() {
        assert_eq!(
            encode_lcd_region(DeviceModel::Xl, Region::new(0, 0, 10, 10), &[]),
            Err(ProtocolError::NoTouchStrip(DeviceModel::Xl))
        );
    }

    #[test]
    fn test_lcd_region_out_of_bounds() {
        let err = encode_lcd_region(DeviceModel::Plus, Region::new(700, 0, 200, 100), &[]);
        assert!(matches!(err, Err(ProtocolError::RegionOutOfBounds { .. })));
    }

    #[test]
    fn test_decode_rejects_out_of_sequence_pages() {
        let data = vec![1u8; 2500];
        let mut frames = encode_button_image(DeviceModel::Mk2, 0, &data).unwrap();
        frames.swap(0, 1);
        assert!(matches!(
            decode_button_image(DeviceModel::Mk2, &frames),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_original_image_roundtrip() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let frames = encode_button_image(DeviceModel::Original, 11, &data).unwrap();
        let (key, decoded) = decode_button_image(DeviceModel::Original, &frames).unwrap();
        assert_eq!(key, 11);
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_identity_parsing() {
        let mut report = vec![0u8; 32];
        report[0] = 0x06;
        report[2..12].copy_from_slice(b"CL12K1A234");
        assert_eq!(
            parse_identity_string(DeviceModel::Mk2, IdentityKind::Serial, &report),
            "CL12K1A234"
        );
        assert_eq!(identity_request(DeviceModel::Mk2, IdentityKind::Serial), (0x06, 32));
        assert_eq!(identity_request(DeviceModel::Mini, IdentityKind::Firmware), (0x04, 17));

        let mut legacy = vec![0u8; 17];
        legacy[0] = 0x04;
        legacy[5..11].copy_from_slice(b"2.0.01");
        legacy[11] = 0xFF;
        assert_eq!(
            parse_identity_string(DeviceModel::Mini, IdentityKind::Firmware, &legacy),
            "2.0.01"
        );
    }
}
