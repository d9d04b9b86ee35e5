//! Compiled-artifact header codec.
//!
//! Layout (little-endian, fixed width):
//!
//! ```text
//! 0..4   magic   (format version, then "\r\n")
//! 4..8   flags   bit0 = hash-based, bit1 = check source on load
//! 8..16  either  mtime:u32 + size:u32   or   hash:[u8; 8]
//! 16..   serialized code object
//! ```

use sha2::{Digest, Sha256};

use crate::runtime::error::CacheError;

/// Bumped whenever the serialized code format changes.
pub const FORMAT_VERSION: u16 = 3571;

/// Magic number stamped at the start of every artifact.
pub const MAGIC_NUMBER: [u8; 4] = {
    let v = FORMAT_VERSION.to_le_bytes();
    [v[0], v[1], b'\r', b'\n']
};

pub const HEADER_LEN: usize = 16;

pub const FLAG_HASH_BASED: u32 = 0b01;
pub const FLAG_CHECK_SOURCE: u32 = 0b10;

/// Validation data carried in an artifact header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactHeader {
    /// Lower 32 bits of the source mtime (seconds) and size.
    Timestamp { mtime: u32, size: u32 },
    /// Truncated content hash of the source.
    Hash { hash: [u8; 8], check_source: bool },
}

impl ArtifactHeader {
    pub fn timestamp(mtime_secs: u64, size: u64) -> Self {
        ArtifactHeader::Timestamp {
            mtime: mtime_secs as u32,
            size: size as u32,
        }
    }

    pub fn hash(source: &[u8], check_source: bool) -> Self {
        ArtifactHeader::Hash {
            hash: source_hash(source),
            check_source,
        }
    }

    pub fn is_hash_based(&self) -> bool {
        matches!(self, ArtifactHeader::Hash { .. })
    }

    fn flags(&self) -> u32 {
        match self {
            ArtifactHeader::Timestamp { .. } => 0,
            ArtifactHeader::Hash { check_source, .. } => {
                FLAG_HASH_BASED | if *check_source { FLAG_CHECK_SOURCE } else { 0 }
            }
        }
    }

    /// Prefix `payload` with this header.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(&MAGIC_NUMBER);
        out.extend_from_slice(&self.flags().to_le_bytes());
        match self {
            ArtifactHeader::Timestamp { mtime, size } => {
                out.extend_from_slice(&mtime.to_le_bytes());
                out.extend_from_slice(&size.to_le_bytes());
            }
            ArtifactHeader::Hash { hash, .. } => out.extend_from_slice(hash),
        }
        out.extend_from_slice(payload);
        out
    }
}

/// Split an artifact into its header and payload.
///
/// Rejects, in order: fewer than 4 bytes, a foreign magic number, a header
/// cut short, and unknown flag bits.
pub fn classify<'a>(data: &'a [u8], name: &str) -> Result<(ArtifactHeader, &'a [u8]), CacheError> {
    if data.len() < MAGIC_NUMBER.len() {
        return Err(CacheError::Truncated { name: name.to_string() });
    }
    if data[..4] != MAGIC_NUMBER {
        return Err(CacheError::BadMagic {
            name: name.to_string(),
            found: data[..4].to_vec(),
        });
    }
    if data.len() < HEADER_LEN {
        return Err(CacheError::Truncated { name: name.to_string() });
    }

    let flags = read_u32(&data[4..8]);
    if flags & !(FLAG_HASH_BASED | FLAG_CHECK_SOURCE) != 0 {
        return Err(CacheError::InvalidFlags {
            name: name.to_string(),
            flags,
        });
    }

    let header = if flags & FLAG_HASH_BASED != 0 {
        let mut hash = [0u8; 8];
        hash.copy_from_slice(&data[8..16]);
        ArtifactHeader::Hash {
            hash,
            check_source: flags & FLAG_CHECK_SOURCE != 0,
        }
    } else {
        ArtifactHeader::Timestamp {
            mtime: read_u32(&data[8..12]),
            size: read_u32(&data[12..16]),
        }
    };
    Ok((header, &data[HEADER_LEN..]))
}

/// Compare a timestamp header against the source's current stat.
pub fn validate_timestamp(
    header: &ArtifactHeader,
    source_mtime_secs: u64,
    source_size: u64,
    name: &str,
) -> Result<(), CacheError> {
    let ArtifactHeader::Timestamp { mtime, size } = *header else {
        return Err(stale(name, "not timestamp-based"));
    };
    if mtime != source_mtime_secs as u32 {
        return Err(stale(name, "source mtime changed"));
    }
    if size != source_size as u32 {
        return Err(stale(name, "source size changed"));
    }
    Ok(())
}

/// Compare a hash header against the hash of the current source bytes.
pub fn validate_hash(header: &ArtifactHeader, source: &[u8], name: &str) -> Result<(), CacheError> {
    let ArtifactHeader::Hash { hash, .. } = *header else {
        return Err(stale(name, "not hash-based"));
    };
    if hash != source_hash(source) {
        return Err(stale(name, "source hash changed"));
    }
    Ok(())
}

/// First 8 bytes of SHA-256 over the magic number and the source bytes.
pub fn source_hash(source: &[u8]) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(MAGIC_NUMBER);
    hasher.update(source);
    let digest = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn stale(name: &str, reason: &'static str) -> CacheError {
    CacheError::Stale {
        name: name.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_timestamp_header_layout() {
        let bytes = ArtifactHeader::timestamp(0x1_0000_0005, 7).encode(b"body");
        assert_eq!(&bytes[..4], &MAGIC_NUMBER);
        assert_eq!(&bytes[4..8], &0u32.to_le_bytes());
        // Only the lower 32 bits of mtime are kept.
        assert_eq!(&bytes[8..12], &5u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &7u32.to_le_bytes());
        assert_eq!(&bytes[16..], b"body");
    }

    #[test]
    fn test_hash_header_flags() {
        let checked = ArtifactHeader::hash(b"x = 1", true).encode(&[]);
        assert_eq!(read_u32(&checked[4..8]), FLAG_HASH_BASED | FLAG_CHECK_SOURCE);
        let unchecked = ArtifactHeader::hash(b"x = 1", false).encode(&[]);
        assert_eq!(read_u32(&unchecked[4..8]), FLAG_HASH_BASED);
    }

    #[test]
    fn test_classify_rejections() {
        assert!(matches!(classify(b"ab", "m"), Err(CacheError::Truncated { .. })));
        assert!(matches!(
            classify(b"\x00\x00\r\nrest-of-file", "m"),
            Err(CacheError::BadMagic { .. })
        ));

        let mut short = MAGIC_NUMBER.to_vec();
        short.extend_from_slice(&[0; 6]);
        assert!(matches!(classify(&short, "m"), Err(CacheError::Truncated { .. })));

        let mut bad_flags = ArtifactHeader::timestamp(1, 1).encode(b"");
        bad_flags[4] = 0b100;
        assert!(matches!(
            classify(&bad_flags, "m"),
            Err(CacheError::InvalidFlags { flags: 0b100, .. })
        ));
    }

    #[test]
    fn test_validate_timestamp() {
        let header = ArtifactHeader::timestamp(100, 20);
        assert!(validate_timestamp(&header, 100, 20, "m").is_ok());
        assert!(validate_timestamp(&header, 101, 20, "m").is_err());
        assert!(validate_timestamp(&header, 100, 21, "m").is_err());
        // Wrap-around at 32 bits still matches.
        assert!(validate_timestamp(&header, 100 + (1 << 32), 20, "m").is_ok());
    }

    #[test]
    fn test_validate_hash() {
        let header = ArtifactHeader::hash(b"a = 1\n", true);
        assert!(validate_hash(&header, b"a = 1\n", "m").is_ok());
        assert!(validate_hash(&header, b"a = 2\n", "m").is_err());
        assert!(validate_hash(&ArtifactHeader::timestamp(0, 0), b"", "m").is_err());
    }

    proptest! {
        #[test]
        fn prop_header_roundtrip(mtime: u32, size: u32, payload in proptest::collection::vec(any::<u8>(), 0..64)) {
            let header = ArtifactHeader::Timestamp { mtime, size };
            let bytes = header.encode(&payload);
            let (decoded, rest) = classify(&bytes, "m").unwrap();
            prop_assert_eq!(decoded, header);
            prop_assert_eq!(rest, payload.as_slice());
        }

        #[test]
        fn prop_foreign_magic_never_accepted(data in proptest::collection::vec(any::<u8>(), 4..40)) {
            prop_assume!(data[..4] != MAGIC_NUMBER);
            let rejected = matches!(classify(&data, "m"), Err(CacheError::BadMagic { .. }));
            prop_assert!(rejected);
        }
    }
}
