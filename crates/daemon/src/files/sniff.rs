//! Binary content detection.
//!
//! Detection is a heuristic: the first chunk of the file is read and the file
//! is treated as binary when that chunk holds a NUL byte. UTF-16 text is
//! therefore reported as binary, and binary formats whose first chunk has no
//! NUL byte are reported as text.

use std::io;
use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Size of the sampled window (64KB).
pub const SNIFF_WINDOW: usize = 64 * 1024;

/// Whether the file at `path` looks binary.
///
/// Fails closed: if the file cannot be opened or read it is reported as
/// binary so callers skip decoding it.
pub async fn is_binary(path: &Path) -> bool {
    match first_chunk(path).await {
        Ok(chunk) => looks_binary(&chunk),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Sniffing failed, treating as binary");
            true
        }
    }
}

/// Whether a sample of bytes looks binary.
pub fn looks_binary(sample: &[u8]) -> bool {
    sample.contains(&0)
}

/// Read a single chunk from the start of the file.
async fn first_chunk(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = File::open(path).await?;
    let mut buffer = vec![0u8; SNIFF_WINDOW];
    let bytes_read = file.read(&mut buffer).await?;
    buffer.truncate(bytes_read);
    Ok(buffer)
}
