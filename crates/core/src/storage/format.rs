use crate::errors::CoreError;

/// Magic bytes identifying a Stock Monitor user-data bundle.
pub const MAGIC: &[u8; 4] = b"SMUD";

/// Header size in bytes: magic(4) + class version(2).
pub const HEADER_SIZE: usize = 6;

/// Write a bundle file to bytes.
///
/// Layout:
/// ```text
/// [SMUD: 4B] [class version: 2B LE] [bincode payload: variable]
/// ```
pub fn write_file(class_version: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&class_version.to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Parse the header from raw file bytes.
/// Returns the class version and the payload slice.
pub fn read_file(data: &[u8]) -> Result<(u16, &[u8]), CoreError> {
    if data.len() < HEADER_SIZE {
        return Err(CoreError::InvalidFileFormat(
            "File too small to be a valid SMUD bundle".into(),
        ));
    }

    if &data[0..4] != MAGIC {
        return Err(CoreError::InvalidFileFormat(
            "Invalid magic bytes, not an SMUD bundle".into(),
        ));
    }

    let class_version = u16::from_le_bytes([data[4], data[5]]);
    Ok((class_version, &data[HEADER_SIZE..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_written_little_endian() {
        let bytes = write_file(2, b"abc");
        assert_eq!(&bytes[..4], b"SMUD");
        assert_eq!(&bytes[4..6], &[2, 0]);
        let (version, payload) = read_file(&bytes).unwrap();
        assert_eq!(version, 2);
        assert_eq!(payload, b"abc");
    }

    #[test]
    fn rejects_foreign_files() {
        assert!(matches!(read_file(b"SM"), Err(CoreError::InvalidFileFormat(_))));
        assert!(matches!(read_file(b"SVTK\x01\x00"), Err(CoreError::InvalidFileFormat(_))));
    }
}
