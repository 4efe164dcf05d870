//! JPEG quality probe.
//!
//! Re-encoding a JPEG cover at a fixed quality either bloats it or throws
//! detail away. The probe reads the luminance quantization table from the
//! file's DQT segment and inverts the IJG quality scaling to recover the
//! quality the file was saved with.
//!
//! IJG scaling, for quality `Q` and standard table entry `s`:
//!
//! ```text
//! scale = Q < 50 ? 5000 / Q : 200 - 2Q
//! q     = clamp((s * scale + 50) / 100, 1, 255)
//! ```
//!
//! The inverse averages `100 * q / s` over all 64 entries to recover `scale`.

use super::params::Quality;

/// Standard IJG luminance table (ITU T.81 Annex K), in zigzag order as
/// it appears inside a DQT segment.
const STD_LUMINANCE_ZIGZAG: [u16; 64] = [
    16, 11, 12, 14, 12, 10, 16, 14, 13, 14, 18, 17, 16, 19, 24, 40, 26, 24, 22, 22, 24, 49, 35,
    37, 29, 40, 58, 51, 61, 60, 57, 51, 56, 55, 64, 72, 92, 78, 64, 68, 87, 69, 55, 56, 80, 109,
    81, 87, 95, 98, 103, 104, 103, 62, 77, 113, 121, 112, 100, 120, 92, 101, 103, 99,
];

const DQT_MARKER: u8 = 0xDB;
const SOS_MARKER: u8 = 0xDA;

/// Estimate the quality a JPEG was encoded with.
///
/// Returns `None` when the bytes are not a JPEG or carry no luminance table.
pub fn estimate_quality(data: &[u8]) -> Option<Quality> {
    let table = find_luminance_table(data)?;

    let scale: f64 = table
        .iter()
        .zip(STD_LUMINANCE_ZIGZAG.iter())
        .map(|(&q, &s)| q as f64 * 100.0 / s as f64)
        .sum::<f64>()
        / 64.0;

    if scale <= 0.0 {
        return None;
    }

    let quality = if scale <= 100.0 {
        (200.0 - scale) / 2.0
    } else {
        5000.0 / scale
    };
    Some(Quality::new(quality.round().max(1.0) as u32))
}

/// Walk JPEG segments up to the first scan and return quantization table 0.
fn find_luminance_table(data: &[u8]) -> Option<[u16; 64]> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }

    let mut first_table = None;
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return first_table;
        }
        let marker = data[pos + 1];
        // Fill bytes between segments
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == SOS_MARKER {
            break;
        }
        // Standalone markers carry no length
        if (0xD0..=0xD7).contains(&marker) || marker == 0x01 {
            pos += 2;
            continue;
        }

        let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if seg_len < 2 {
            return first_table;
        }
        let seg_start = pos + 4;
        let seg_end = (pos + 2 + seg_len).min(data.len());

        if marker == DQT_MARKER {
            for (id, table) in parse_dqt(&data[seg_start..seg_end]) {
                if id == 0 {
                    return Some(table);
                }
                first_table.get_or_insert(table);
            }
        }

        pos += 2 + seg_len;
    }

    first_table
}

/// Parse every table in a DQT payload as `(table id, values)`.
///
/// Each table is one `Pq/Tq` byte (precision high nibble, id low nibble)
/// followed by 64 entries of 8 or 16 bits.
fn parse_dqt(payload: &[u8]) -> Vec<(u8, [u16; 64])> {
    let mut tables = Vec::new();
    let mut pos = 0;

    while pos < payload.len() {
        let precision = payload[pos] >> 4;
        let id = payload[pos] & 0x0F;
        pos += 1;

        let entry_size = if precision == 0 { 1 } else { 2 };
        if pos + 64 * entry_size > payload.len() {
            break;
        }

        let mut table = [0u16; 64];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = if entry_size == 1 {
                payload[pos + i] as u16
            } else {
                u16::from_be_bytes([payload[pos + 2 * i], payload[pos + 2 * i + 1]])
            };
        }
        tables.push((id, table));
        pos += 64 * entry_size;
    }

    tables
}
