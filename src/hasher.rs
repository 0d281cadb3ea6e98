use crate::result::Result;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;

/** Content hasher used as the authoritative change signal
 *
 * # Architecture
 * - SHA-256 over the raw file bytes, rendered as lowercase hex
 * - Modification times are never consulted: touching a file without
 *   changing its bytes does not invalidate anything
 *
 * # Example
 * ```ignore
 * let hasher = ContentHasher::new();
 * let digest = hasher.hash_file(Path::new("main.cpp")).await?;
 * assert_eq!(digest.len(), 64);
 * ```
 */
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentHasher;

impl ContentHasher {
    pub fn new() -> Self {
        Self
    }

    /** Computes the hex digest of a file's content
     *
     * # Errors
     * - `CxxBuildError::Io` if the file cannot be read
     */
    pub async fn hash_file(&self, file_path: &Path) -> Result<String> {
        let content = fs::read(file_path).await?;
        Ok(self.hash_bytes(&content))
    }

    pub fn hash_bytes(&self, content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        format!("{:x}", hasher.finalize())
    }

    /** Compares a file's current content against a stored digest
     *
     * # Returns
     * - `Ok(true)` if the content still hashes to `stored_hash`
     * - `Ok(false)` on mismatch
     * - `Err` if the file cannot be read
     */
    pub async fn verify_file(&self, file_path: &Path, stored_hash: &str) -> Result<bool> {
        Ok(self.hash_file(file_path).await? == stored_hash)
    }
}
