use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters persisted in the `line_fingerprint CHAR(32)` column.
pub const FINGERPRINT_LEN: usize = 32;

/// Content hash of a raw source line or file: the first 128 bits of SHA-256, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn fingerprint(content: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();
    Fingerprint(hex::encode(&digest[..FINGERPRINT_LEN / 2]))
}

/// Fingerprint of a single source line. Trailing `\n` / `\r\n` are not part of the content.
pub fn fingerprint_line(line: &[u8]) -> Fingerprint {
    fingerprint(strip_line_terminator(line))
}

pub(crate) fn strip_line_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint(b"1957-001A    00001  D SL-1 R/B");
        let b = fingerprint(b"1957-001A    00001  D SL-1 R/B");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), FINGERPRINT_LEN);
        assert!(a.as_str().bytes().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_single_byte_change_differs() {
        let base = b"1957-001B    00002  * SPUTNIK 1".to_vec();
        let original = fingerprint(&base);
        for idx in 0..base.len() {
            let mut changed = base.clone();
            changed[idx] ^= 0x01;
            assert_ne!(original, fingerprint(&changed), "byte {idx} change not detected");
        }
    }

    #[test]
    fn test_line_terminator_ignored() {
        let plain = fingerprint_line(b"ISS (ZARYA)");
        assert_eq!(plain, fingerprint_line(b"ISS (ZARYA)\n"));
        assert_eq!(plain, fingerprint_line(b"ISS (ZARYA)\r\n"));
        assert_ne!(plain, fingerprint_line(b"ISS (ZARYA) \n"));
    }
}
