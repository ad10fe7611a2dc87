//! Reading log sources from disk
//!
//! Plain text logs are read as raw bytes so the caller decides where the last
//! complete line ends. Rotated snapshots (`.xz` as the bus logger writes them,
//! `.gz`, `.zip`) are decompressed fully into memory; they never grow, so
//! there is nothing to tail.

use crate::error::IngestError;
use flate2::read::GzDecoder;
use std::borrow::Cow;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use xz2::read::XzDecoder;

/// How a log source is stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Growing text file (`.log` or `.txt`)
    Plain,
    /// Single gzip stream
    Gzip,
    /// LZMA/xz stream, the bus logger's rotation format
    Xz,
    /// Zip archive holding a `.log` member
    Zip,
    /// Any other extension; refused on load
    Unsupported,
}

impl SourceKind {
    /// Classify a path by its extension
    pub fn of(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("log" | "txt") => Self::Plain,
            Some("gz") => Self::Gzip,
            Some("xz") => Self::Xz,
            Some("zip") => Self::Zip,
            _ => Self::Unsupported,
        }
    }

    /// Whether the source may still grow and can be polled
    pub fn is_taillable(&self) -> bool {
        matches!(self, Self::Plain)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Zip => "zip",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Decode log bytes as UTF-8, falling back to Latin-1
///
/// Latin-1 maps every byte to a char, so decoding never fails.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(e) => {
            tracing::debug!(
                "Log data is not UTF-8 (at byte {}), decoding as Latin-1",
                e.valid_up_to()
            );
            Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())
        }
    }
}

/// Length of the prefix made of complete (newline-terminated) lines
pub fn complete_prefix_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |idx| idx + 1)
}

/// Decompress a snapshot into memory
pub fn read_snapshot(path: &Path, kind: SourceKind) -> Result<Vec<u8>, IngestError> {
    if kind == SourceKind::Unsupported {
        return Err(IngestError::UnsupportedSource(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|e| IngestError::io(path, e))?;
    match kind {
        SourceKind::Gzip => decompress(path, GzDecoder::new(file)),
        SourceKind::Xz => decompress(path, XzDecoder::new(file)),
        SourceKind::Zip => read_zip_member(path, file),
        SourceKind::Plain => {
            let mut bytes = Vec::new();
            let mut file = file;
            file.read_to_end(&mut bytes)
                .map_err(|e| IngestError::io(path, e))?;
            Ok(bytes)
        }
        SourceKind::Unsupported => Err(IngestError::UnsupportedSource(path.to_path_buf())),
    }
}

/// Drain a decoder; corrupt data is an archive error, not an I/O one
fn decompress(path: &Path, mut decoder: impl Read) -> Result<Vec<u8>, IngestError> {
    let mut bytes = Vec::new();
    decoder
        .read_to_end(&mut bytes)
        .map_err(|e| IngestError::Archive {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(bytes)
}

/// First member whose name ends in `.log`
fn read_zip_member(path: &Path, file: File) -> Result<Vec<u8>, IngestError> {
    let archive_error = |e: zip::result::ZipError| IngestError::Archive {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut archive = zip::ZipArchive::new(file).map_err(archive_error)?;
    for index in 0..archive.len() {
        let mut member = archive.by_index(index).map_err(archive_error)?;
        if !member.name().to_ascii_lowercase().ends_with(".log") {
            continue;
        }
        tracing::debug!("Reading {} from {}", member.name(), path.display());
        let mut bytes = Vec::new();
        member
            .read_to_end(&mut bytes)
            .map_err(|e| IngestError::io(path, e))?;
        return Ok(bytes);
    }
    Err(IngestError::ArchiveMissingMember(path.to_path_buf()))
}
