//! Decoding of `.hgt.zip` archives into sample buffers.
//!
//! An archive holds one `.hgt` entry: `width × width` big-endian signed
//! 16-bit samples, row-major from the north-west corner. Samples outside the
//! physical range are replaced by [`VOID_VALUE`](crate::tile::VOID_VALUE)
//! while decoding.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use zip::ZipArchive;

use crate::error::{Result, SrtmError};
use crate::tile::{sanitize_sample, SrtmResolution};

/// Chunk of the stream decoded per read; must be even.
const READ_CHUNK: usize = 64 * 1024;

/// Decode a raw `.hgt` stream holding exactly `width × width` samples.
///
/// # Errors
///
/// - [`SrtmError::InvalidTileSize`] if the stream ends early or carries
///   trailing bytes
/// - [`SrtmError::Io`] if reading fails
pub fn decode_samples<R: Read>(mut reader: R, width: usize) -> Result<Vec<i16>> {
    let expected = 2 * width * width;
    let mut samples = Vec::with_capacity(width * width);
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut pending: Option<u8> = None;
    let mut size = 0usize;

    loop {
        let len = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        size += len;
        if size > expected {
            return Err(SrtmError::InvalidTileSize { size, expected });
        }

        let mut bytes = &chunk[..len];
        // A sample may straddle two reads
        if let Some(high) = pending.take() {
            samples.push(sanitize_sample(i16::from_be_bytes([high, bytes[0]])));
            bytes = &bytes[1..];
        }
        let mut pairs = bytes.chunks_exact(2);
        for pair in &mut pairs {
            samples.push(sanitize_sample(i16::from_be_bytes([pair[0], pair[1]])));
        }
        pending = pairs.remainder().first().copied();
    }

    if size != expected {
        return Err(SrtmError::InvalidTileSize { size, expected });
    }

    Ok(samples)
}

/// Open a local `.hgt.zip` archive and decode its elevation entry.
///
/// The entry is the first one whose name ends in `.hgt` (case-insensitive).
///
/// # Errors
///
/// - [`SrtmError::DecodeFailed`] if the archive is unreadable, has no `.hgt`
///   entry, or its compressed stream is corrupt
/// - [`SrtmError::InvalidTileSize`] if the entry is not a full grid
pub fn read_archive(path: &Path, width: usize) -> Result<Vec<i16>> {
    let decode_failed = |reason: String| SrtmError::DecodeFailed {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| decode_failed(format!("Failed to read ZIP archive: {}", e)))?;

    // Search for an .hgt file in the archive
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| decode_failed(format!("Failed to read ZIP entry: {}", e)))?;

        let entry_name = entry.name().to_string();
        if !entry_name.to_ascii_lowercase().ends_with(".hgt") {
            continue;
        }

        let samples = decode_samples(entry, width).map_err(|e| match e {
            SrtmError::Io(io) => {
                decode_failed(format!("Failed to extract {}: {}", entry_name, io))
            }
            other => other,
        })?;

        tracing::debug!(
            path = %path.display(),
            entry = %entry_name,
            samples = samples.len(),
            "Decoded tile archive"
        );
        return Ok(samples);
    }

    Err(decode_failed("No .hgt file found in ZIP archive".to_string()))
}

/// Elevation entry of an archive, as listed in its central directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry name, e.g. `N52E004.hgt`.
    pub name: String,
    /// Uncompressed size in bytes.
    pub size: u64,
}

impl ArchiveEntry {
    /// Resolution implied by the uncompressed size, if it is a full grid.
    pub fn resolution(&self) -> Option<SrtmResolution> {
        SrtmResolution::from_tile_bytes(self.size as usize)
    }
}

/// Locate the `.hgt` entry of an archive without decoding it.
pub fn inspect_archive(path: &Path) -> Result<ArchiveEntry> {
    let decode_failed = |reason: String| SrtmError::DecodeFailed {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| decode_failed(format!("Failed to read ZIP archive: {}", e)))?;

    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| decode_failed(format!("Failed to read ZIP entry: {}", e)))?;
        if entry.name().to_ascii_lowercase().ends_with(".hgt") {
            return Ok(ArchiveEntry {
                name: entry.name().to_string(),
                size: entry.size(),
            });
        }
    }

    Err(decode_failed("No .hgt file found in ZIP archive".to_string()))
}
