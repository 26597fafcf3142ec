//! Binary framing for log and snapshot records.
//!
//! Every record is framed as:
//! - a version byte for forward compatibility
//! - a little-endian length prefix
//! - the JSON body (reuses the serde attributes on the domain types)
//! - a CRC32 of the body for corruption detection

use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

/// Current codec version.
const CODEC_VERSION: u8 = 1;

/// Upper bound on a single record body.
const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// Magic bytes at the start of every directory file.
pub const MAGIC: [u8; 4] = *b"CRES";

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Serializes a value into one framed record.
///
/// Format:
/// ```text
/// [version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
/// ```
pub fn encode<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let data = serde_json::to_vec(value)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("serialization failed: {e}")))?;
    let len = u32::try_from(data.len())
        .ok()
        .filter(|len| (*len as usize) <= MAX_RECORD_SIZE)
        .ok_or_else(|| {
            IoError::new(
                ErrorKind::InvalidData,
                format!("record size {} exceeds maximum {MAX_RECORD_SIZE}", data.len()),
            )
        })?;

    let mut out = Vec::with_capacity(1 + 4 + data.len() + 4);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&checksum(&data).to_le_bytes());
    Ok(out)
}

/// Reads one framed record and verifies its checksum.
///
/// # Errors
/// - `UnexpectedEof` if the record is cut short (torn write)
/// - `InvalidData` on version mismatch, oversized length, CRC mismatch, or bad JSON
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read) -> IoResult<T> {
    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != CODEC_VERSION {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!(
                "unsupported codec version: {} (expected {CODEC_VERSION})",
                version[0]
            ),
        ));
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_RECORD_SIZE {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("record size {len} exceeds maximum {MAX_RECORD_SIZE}"),
        ));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored = u32::from_le_bytes(crc_bytes);
    let computed = checksum(&data);
    if stored != computed {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("CRC mismatch: stored={stored:08x}, computed={computed:08x}"),
        ));
    }

    serde_json::from_slice(&data)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("deserialization failed: {e}")))
}

/// Write the file header (magic + version).
pub fn write_header(writer: &mut impl Write) -> IoResult<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[CODEC_VERSION])?;
    Ok(())
}

/// Read and validate the file header. Returns the file's codec version.
pub fn read_header(reader: &mut impl Read) -> IoResult<u8> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("invalid magic bytes: expected {MAGIC:?}, got {magic:?}"),
        ));
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    Ok(version[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::contact::Contact;
    use crate::scope::Scope;

    #[test]
    fn test_contact_record_decodes() {
        let contact = Contact::new(Scope::parse("t1", Some("c1")).unwrap(), "Acme Pte Ltd");
        let encoded = encode(&contact).unwrap();

        let decoded: Contact = decode(&mut Cursor::new(encoded)).unwrap();
        assert_eq!(decoded, contact);
    }

    #[test]
    fn test_detects_corruption() {
        let mut encoded = encode(&"Acme Trading".to_string()).unwrap();
        encoded[8] ^= 0xFF;

        let err = decode::<String>(&mut Cursor::new(encoded)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_torn_record_is_eof() {
        let encoded = encode(&"Acme Trading".to_string()).unwrap();
        let torn = encoded[..encoded.len() - 3].to_vec();

        let err = decode::<String>(&mut Cursor::new(torn)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_rejects_oversized_record() {
        let mut bad = vec![CODEC_VERSION];
        bad.extend_from_slice(&200_000_000u32.to_le_bytes());

        let err = decode::<String>(&mut Cursor::new(bad)).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_header_rejects_foreign_file() {
        let mut buf = Vec::new();
        write_header(&mut buf).unwrap();
        assert_eq!(read_header(&mut Cursor::new(buf)).unwrap(), CODEC_VERSION);

        let err = read_header(&mut Cursor::new(b"KYRO\x01".to_vec())).unwrap_err();
        assert!(err.to_string().contains("invalid magic"));
    }
}
