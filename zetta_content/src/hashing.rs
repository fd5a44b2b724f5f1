//! Content hashes of asset payloads.
//!
//! The hash of an asset always covers the exact payload bytes that are written to the asset
//! file. Neither the header nor the import settings are part of it, so two assets with equal
//! content but different import settings compare equal.

use sha2::{Digest, Sha256};

/// Size of a content hash in bytes.
pub const HASH_SIZE: usize = 32;

/// Computes the SHA-256 digest of `data`.
///
/// # Example
///
/// ```rust
/// use zetta_content::hashing::{compute_hash, HASH_SIZE};
/// let hash = compute_hash(b"payload");
/// assert_eq!(hash.len(), HASH_SIZE);
/// assert_eq!(hash, compute_hash(b"payload"));
/// ```
pub fn compute_hash(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes the SHA-256 digest of `count` bytes of `data` starting at `offset`. The range is cut
/// at the end of `data`.
pub fn compute_hash_range(data: &[u8], offset: usize, count: usize) -> Vec<u8> {
    let start = offset.min(data.len());
    let end = start.saturating_add(count).min(data.len());
    compute_hash(&data[start..end])
}

/// Formats a hash as lowercase hex.
pub fn hash_to_hex(hash: &[u8]) -> String {
    hash.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        let hash = compute_hash(b"abc");
        assert_eq!(
            hash_to_hex(&hash),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn single_bit_flip_changes_digest() {
        // Given
        let data = vec![0x5au8; 1024];
        let mut flipped = data.clone();
        flipped[512] ^= 0x01;

        // When
        let first = compute_hash(&data);
        let second = compute_hash(&data);
        let third = compute_hash(&flipped);

        // Then
        assert_eq!(first, second);
        assert_ne!(first, third);
    }

    #[test]
    fn range_is_clamped() {
        let data = b"0123456789";
        assert_eq!(compute_hash_range(data, 2, 3), compute_hash(b"234"));
        assert_eq!(compute_hash_range(data, 8, 100), compute_hash(b"89"));
        assert_eq!(compute_hash_range(data, 100, 1), compute_hash(b""));
    }
}
