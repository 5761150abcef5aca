// Content hashing used by conflict detection and the equal-mtime fallback.
// xxh3 is not cryptographic; it only has to answer "same bytes or not".

use crate::error::Result;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

pub fn hash_bytes(data: &[u8]) -> u64 {
    xxh3_64(data)
}

pub async fn hash_file(path: &Path) -> Result<u64> {
    let data = tokio::fs::read(path).await?;
    Ok(xxh3_64(&data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_hash_equal() {
        assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }

    #[tokio::test]
    async fn file_hash_matches_byte_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"content").unwrap();
        assert_eq!(hash_file(&path).await.unwrap(), hash_bytes(b"content"));
    }
}
