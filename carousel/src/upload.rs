//! Multipart parsing and upload staging.
//!
//! The `file` field is streamed to a named temporary file before the pipeline sees it. The temp
//! file is owned by [`UploadRequest`] and removed when the request is dropped, on success and
//! failure alike.

use std::path::Path;

use axum::extract::Multipart;
use axum::http::StatusCode;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::pipeline::MAX_TILES;

/// A validated crop request: the staged image plus the tile count.
#[derive(Debug)]
pub struct UploadRequest {
    file: NamedTempFile,
    pub file_name: Option<String>,
    /// Size of the staged file in bytes
    pub size: u64,
    /// Number of tiles, at least 1
    pub n: u32,
}

impl UploadRequest {
    /// Pull `file` and `n` out of a multipart body.
    ///
    /// The file check runs before the count check, so a request missing both reports the file.
    /// Unknown fields are skipped; only the first `file` field is kept.
    pub async fn from_multipart(multipart: &mut Multipart, temp_dir: &Path, max_tiles: u32) -> Result<Self> {
        let mut staged: Option<(NamedTempFile, Option<String>, u64)> = None;
        let mut raw_count: Option<String> = None;

        while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "file" if staged.is_none() => {
                    let file_name = field.file_name().map(str::to_string);
                    let temp = NamedTempFile::new_in(temp_dir)
                        .map_err(|e| Error::internal(format!("create temp file in {}: {e}", temp_dir.display())))?;
                    let mut out = tokio::fs::File::from_std(temp.reopen()?);

                    let mut size = 0u64;
                    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                        size += chunk.len() as u64;
                        out.write_all(&chunk).await?;
                    }
                    out.flush().await?;

                    debug!(file_name = ?file_name, size, path = %temp.path().display(), "Staged upload");
                    staged = Some((temp, file_name, size));
                }
                "n" if raw_count.is_none() => {
                    raw_count = Some(field.text().await.map_err(multipart_error)?);
                }
                other => {
                    debug!(field = other, "Ignoring multipart field");
                }
            }
        }

        let (file, file_name, size) = match staged {
            Some(staged) if staged.2 > 0 => staged,
            _ => return Err(Error::MissingFile),
        };
        let n = parse_count(raw_count.as_deref(), max_tiles)?;

        Ok(Self { file, file_name, size, n })
    }

    /// Wrap an already staged file. Used by tests and non-HTTP callers.
    pub fn from_staged(file: NamedTempFile, n: u32) -> Result<Self> {
        let size = file.as_file().metadata()?.len();
        Ok(Self {
            file,
            file_name: None,
            size,
            n,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Read the staged image back into memory.
    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path()).await?)
    }

    /// Remove the staged file now, logging instead of failing if that does not work.
    pub fn close(self) {
        let path = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => debug!(path = %path.display(), "Temporary upload removed"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temporary upload"),
        }
    }
}

/// Parse the `n` form field.
///
/// Reads the leading base-10 integer after any whitespace, with an optional sign, and ignores
/// whatever follows it, so `"2.5"` is 2 and `"3abc"` is 3. Rejected when there are no digits, or
/// the value is below 1, above `max_tiles` (when non-zero) or too wide for a canvas.
pub fn parse_count(raw: Option<&str>, max_tiles: u32) -> Result<u32> {
    let invalid = || Error::InvalidCount {
        raw: raw.map(str::to_string),
    };

    let value = raw.and_then(leading_integer).ok_or_else(invalid)?;
    if value < 1 || value > i64::from(MAX_TILES) {
        return Err(invalid());
    }
    if max_tiles > 0 && value > i64::from(max_tiles) {
        return Err(invalid());
    }
    Ok(value as u32)
}

/// Optional sign followed by at least one digit; values past `i64` saturate.
fn leading_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }

    let magnitude = rest[..digits].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        debug!(error = %err.body_text(), "Upload exceeded the body limit");
        Error::PayloadTooLarge {
            message: "Arquivo muito grande.".to_string(),
        }
    } else {
        debug!(error = %err.body_text(), "Malformed multipart body");
        Error::BadRequest {
            message: "Dados do formulário inválidos.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_count_accepts_positive_integers() {
        assert_eq!(parse_count(Some("1"), 0).unwrap(), 1);
        assert_eq!(parse_count(Some(" 12 "), 0).unwrap(), 12);
        assert_eq!(parse_count(Some("+4"), 0).unwrap(), 4);
        assert_eq!(parse_count(Some("10"), 10).unwrap(), 10);
    }

    #[test]
    fn test_parse_count_reads_leading_integer() {
        assert_eq!(parse_count(Some("2.5"), 0).unwrap(), 2);
        assert_eq!(parse_count(Some("3abc"), 0).unwrap(), 3);
        assert_eq!(parse_count(Some("2e3"), 0).unwrap(), 2);
        assert_eq!(parse_count(Some("\t7 tiles"), 0).unwrap(), 7);
    }

    #[test]
    fn test_parse_count_rejects_bad_values() {
        for raw in [Some("0"), Some("-1"), Some("abc"), Some(""), Some("-"), Some(".5"), Some("0.9"), None] {
            let err = parse_count(raw, 0).unwrap_err();
            assert!(matches!(err, Error::InvalidCount { .. }), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn test_parse_count_enforces_limits() {
        assert!(parse_count(Some("11"), 10).is_err());
        assert!(parse_count(Some(&(u64::from(MAX_TILES) + 1).to_string()), 0).is_err());
        assert!(parse_count(Some("99999999999999999999999"), 0).is_err());
        assert_eq!(parse_count(Some(&MAX_TILES.to_string()), 0).unwrap(), MAX_TILES);
    }

    #[test]
    fn test_staged_file_removed_on_drop_and_close() {
        let dir = tempfile::tempdir().unwrap();

        let upload = UploadRequest::from_staged(NamedTempFile::new_in(dir.path()).unwrap(), 1).unwrap();
        let path = upload.path().to_path_buf();
        assert!(path.exists());
        drop(upload);
        assert!(!path.exists());

        let upload = UploadRequest::from_staged(NamedTempFile::new_in(dir.path()).unwrap(), 1).unwrap();
        let path = upload.path().to_path_buf();
        upload.close();
        assert!(!path.exists());
    }
}
