//! Snapshot payload sent after `FULLRESYNC`.
//!
//! No real snapshot is produced: a master always transfers the same empty
//! RDB file (header, aux fields, no keys). Replicas only summarize what they
//! receive for the log; nothing is loaded into the store.

/// Empty RDB file: `REDIS0011`, aux fields, end-of-file marker, checksum.
const EMPTY_RDB_HEX: &str = "524544495330303131fa0972656469732d76657205372e322e30fa0a72656469732d62697473c040fa056374696d65c26d08bc65fa08757365642d6d656dc2b0c41000fa08616f662d62617365c000fff06e3bfec0ff5aa2";

const MAGIC: &[u8] = b"REDIS";

pub fn empty_snapshot() -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(EMPTY_RDB_HEX)
}

/// What a received snapshot contains, without its data.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub version: String,
    pub aux: Vec<(String, String)>,
    pub keys: usize,
}

/// Decodes a "size-encoded" value.
/// Returns the decoded size and the number of bytes consumed to read it.
fn decode_length(buf: &[u8]) -> Result<(usize, usize), String> {
    let Some(&first) = buf.first() else {
        return Err("Buffer too short for length decoding".to_string());
    };
    match first >> 6 {
        0b00 => Ok(((first & 0x3F) as usize, 1)),
        0b01 => {
            if buf.len() < 2 {
                return Err("Buffer too short for 14-bit size".to_string());
            }
            let size = (((first & 0x3F) as usize) << 8) | buf[1] as usize;
            Ok((size, 2))
        }
        0b10 => {
            if buf.len() < 5 {
                return Err("Buffer too short for 32-bit size".to_string());
            }
            let size = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
            Ok((size, 5))
        }
        _ => Err("Length-encoded string cannot start with 11".to_string()),
    }
}

/// Decodes a string, which can be length-prefixed or a special integer format.
/// Returns the string and the number of bytes consumed.
fn decode_string(buf: &[u8]) -> Result<(String, usize), String> {
    let Some(&first) = buf.first() else {
        return Err("Buffer too short for string decoding".to_string());
    };
    if first >> 6 != 0b11 {
        let (len, header) = decode_length(buf)?;
        let data = buf
            .get(header..header + len)
            .ok_or_else(|| "Buffer too short for string data".to_string())?;
        return Ok((String::from_utf8_lossy(data).into_owned(), header + len));
    }

    // Integers are stored little-endian after the flag byte.
    let (value, width) = match (first, &buf[1..]) {
        (0xC0, [a, ..]) => (i64::from(*a as i8), 1),
        (0xC1, [a, b, ..]) => (i64::from(i16::from_le_bytes([*a, *b])), 2),
        (0xC2, [a, b, c, d, ..]) => (i64::from(i32::from_le_bytes([*a, *b, *c, *d])), 4),
        (0xC0..=0xC2, _) => {
            return Err(format!("Buffer too short for integer format {:02X}", first))
        }
        _ => return Err(format!("Unsupported special string format: {:02X}", first)),
    };
    Ok((value.to_string(), 1 + width))
}

/// Walks a snapshot and reports its version, aux fields and number of keys.
pub fn inspect_snapshot(buf: &[u8]) -> Result<SnapshotSummary, String> {
    if buf.len() < 9 || &buf[..5] != MAGIC {
        return Err("Invalid RDB file header".to_string());
    }
    let mut summary = SnapshotSummary {
        version: String::from_utf8_lossy(&buf[5..9]).into_owned(),
        ..Default::default()
    };

    let mut i = 9;
    while let Some(&byte) = buf.get(i) {
        match byte {
            0xFA => {
                i += 1;
                let (key, used) = decode_string(&buf[i..])?;
                i += used;
                let (value, used) = decode_string(&buf[i..])?;
                i += used;
                summary.aux.push((key, value));
            }
            0xFE => {
                // Database selector
                i += 1;
                let (_, used) = decode_length(&buf[i..])?;
                i += used;
            }
            0xFB => {
                // Resize hints
                i += 1;
                let (_, used) = decode_length(&buf[i..])?;
                i += used;
                let (_, used) = decode_length(&buf[i..])?;
                i += used;
            }
            0xFD => i += 5,
            0xFC => i += 9,
            0x00 => {
                i += 1;
                let (_, used) = decode_string(&buf[i..])?;
                i += used;
                let (_, used) = decode_string(&buf[i..])?;
                i += used;
                summary.keys += 1;
            }
            0xFF => return Ok(summary),
            _ => {
                return Err(format!(
                    "Unknown or unhandled RDB section type: 0x{:02X} at position {}",
                    byte, i
                ))
            }
        }
    }
    Err("RDB file ended without an EOF marker".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_an_empty_rdb() {
        let bytes = empty_snapshot().unwrap();
        assert_eq!(bytes.len(), 88);
        assert!(bytes.starts_with(b"REDIS0011"));

        let summary = inspect_snapshot(&bytes).unwrap();
        assert_eq!(summary.version, "0011");
        assert_eq!(summary.keys, 0);
        assert_eq!(summary.aux[0], ("redis-ver".to_string(), "7.2.0".to_string()));
        assert_eq!(summary.aux[1], ("redis-bits".to_string(), "64".to_string()));
        assert_eq!(summary.aux.len(), 5);
    }

    #[test]
    fn counts_string_entries() {
        let mut buf = b"REDIS0011".to_vec();
        buf.extend_from_slice(&[0xFE, 0x00, 0xFB, 0x02, 0x01]);
        buf.extend_from_slice(&[0x00, 0x01, b'a', 0x01, b'1']);
        buf.extend_from_slice(&[0xFC, 0, 0, 0, 0, 0, 0, 0, 0]);
        buf.extend_from_slice(&[0x00, 0x01, b'b', 0xC1, 0x39, 0x05]);
        buf.push(0xFF);

        let summary = inspect_snapshot(&buf).unwrap();
        assert_eq!(summary.keys, 2);
        assert!(summary.aux.is_empty());
    }

    #[test]
    fn rejects_garbage() {
        assert!(inspect_snapshot(b"NOTRDB").is_err());
        assert!(inspect_snapshot(b"REDIS0011").is_err());
        assert!(inspect_snapshot(b"REDIS0011\xFA\x05ab").is_err());
    }
}
