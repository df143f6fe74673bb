//! Streaming content hashing.
//!
//! The digest is the resume-state key, so it must be identical for identical
//! byte content no matter how the file is read. The file is consumed in
//! fixed-size windows (independent of the transfer chunk size) feeding a
//! streaming MD5 accumulator; MD5 is the protocol's digest algorithm, kept
//! for wire compatibility with the signing scheme.

use md5::{Digest, Md5};
use nosup_core::models::ContentDigest;
use nosup_core::UploadError;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;

/// Result of a hash run: either a digest or an abort observed between
/// windows. The window in flight when an abort arrives is finished first.
#[derive(Debug)]
pub enum HashOutcome {
    Complete(ContentDigest),
    Aborted,
}

/// Compute the MD5 digest of `path`, reading in `window_size` byte windows.
///
/// `on_progress` is called after each window with a fraction in (0, 1],
/// exactly 1.0 on the final window, and immediately 1.0 for an empty file.
/// `is_aborted` is polled between windows; no partial digest is produced on
/// abort or read failure.
pub async fn compute_digest<P, A>(
    path: &Path,
    window_size: usize,
    mut on_progress: P,
    mut is_aborted: A,
) -> Result<HashOutcome, UploadError>
where
    P: FnMut(f64),
    A: FnMut() -> bool,
{
    let mut file = fs::File::open(path).await?;
    let size = file.metadata().await?.len();

    let mut hasher = Md5::new();
    if size == 0 {
        on_progress(1.0);
        return Ok(HashOutcome::Complete(ContentDigest::new(hex::encode(
            hasher.finalize(),
        ))));
    }

    let mut window = vec![0u8; window_size.max(1)];
    let mut hashed: u64 = 0;
    loop {
        let read = file.read(&mut window).await?;
        if read == 0 {
            break;
        }
        hasher.update(&window[..read]);
        hashed += read as u64;
        on_progress((hashed as f64 / size as f64).min(1.0));
        if is_aborted() {
            return Ok(HashOutcome::Aborted);
        }
    }

    Ok(HashOutcome::Complete(ContentDigest::new(hex::encode(
        hasher.finalize(),
    ))))
}
