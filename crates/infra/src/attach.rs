//! File-attach decoding
//!
//! Archive-style endpoints answer with a multipart body: the part named
//! `result` is the JSON envelope and every other part is an attached file.

use std::io::ErrorKind as IoKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use pangea_domain::constants::{
    CONTENT_TYPE_OCTET_STREAM, DOWNLOAD_FILENAME_PREFIX, DOWNLOAD_TIMESTAMP_FORMAT,
    MULTIPART_RESULT_PART,
};
use pangea_domain::{AttachedFile, PangeaError, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;
use url::Url;

use crate::errors::InfraError;
use crate::http::RawResponse;
use crate::multipart::{parse_boundary, parse_content_disposition, split};

/// Whether a response content type carries attached files
pub fn is_multipart(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    essence.eq_ignore_ascii_case("multipart/mixed")
        || essence.eq_ignore_ascii_case("multipart/form-data")
}

/// Separate the envelope part from the attached files
///
/// # Errors
///
/// [`PangeaError::Unmarshal`] when the boundary is missing or the body is
/// not valid multipart.
pub fn split_response(response: &RawResponse) -> Result<(Bytes, Vec<AttachedFile>)> {
    let content_type = response.content_type().unwrap_or_default();
    let boundary = parse_boundary(content_type).ok_or_else(|| PangeaError::Unmarshal {
        message: format!("multipart response without boundary: {content_type}"),
        body: response.body.to_vec(),
    })?;

    let mut parts = split(&response.body, &boundary)?;
    let envelope_index = parts
        .iter()
        .position(|part| part.disposition().name.as_deref() == Some(MULTIPART_RESULT_PART))
        .unwrap_or(0);
    if parts.is_empty() {
        return Err(PangeaError::Unmarshal {
            message: "multipart response has no parts".to_string(),
            body: response.body.to_vec(),
        });
    }
    let envelope = parts.remove(envelope_index).body;

    let now = Utc::now();
    let files = parts
        .into_iter()
        .map(|part| {
            let filename = filename_for(part.disposition().filename.as_deref(), None, now);
            let content_type = part.content_type().unwrap_or(CONTENT_TYPE_OCTET_STREAM).to_string();
            AttachedFile::new(filename, content_type, part.body.to_vec())
        })
        .collect::<Vec<_>>();
    debug!(attached = files.len(), "split multipart response");

    Ok((envelope, files))
}

/// Attached file for a plain download response
pub fn from_download(response: &RawResponse) -> AttachedFile {
    let disposition = response
        .headers
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .map(parse_content_disposition)
        .and_then(|parsed| parsed.filename);
    let filename = filename_for(disposition.as_deref(), Some(&response.url), Utc::now());
    let content_type = response.content_type().unwrap_or(CONTENT_TYPE_OCTET_STREAM).to_string();
    AttachedFile::new(filename, content_type, response.body.to_vec())
}

/// Resolve a filename: disposition, then the URL's last path segment,
/// then `download_<YYYYmmdd_HHMMSS>`
pub fn filename_for(disposition: Option<&str>, url: Option<&Url>, now: DateTime<Utc>) -> String {
    disposition
        .and_then(sanitize)
        .or_else(|| {
            url.and_then(|url| url.path_segments())
                .and_then(|mut segments| segments.next_back().map(str::to_string))
                .and_then(|segment| sanitize(&segment))
        })
        .unwrap_or_else(|| {
            format!("{DOWNLOAD_FILENAME_PREFIX}{}", now.format(DOWNLOAD_TIMESTAMP_FORMAT))
        })
}

/// Final path component only, so names cannot escape the target folder
fn sanitize(name: &str) -> Option<String> {
    Path::new(name.trim())
        .file_name()
        .map(|file| file.to_string_lossy().into_owned())
        .filter(|file| !file.is_empty() && file != "." && file != "..")
}

/// `report (n).pdf` for collision number `n`
fn numbered(filename: &str, n: u32) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({n}).{ext}"),
        _ => format!("{filename} ({n})"),
    }
}

/// Save `file` under `folder` using its own filename
///
/// # Errors
///
/// [`PangeaError::Io`] when the folder cannot be created or written.
pub async fn save(file: &AttachedFile, folder: impl AsRef<Path>) -> Result<PathBuf> {
    save_as(file, folder, &file.filename).await
}

/// Save `file` under `folder` as `filename`, never overwriting
///
/// An existing file gets the next free ` (n)` suffix before the extension.
///
/// # Errors
///
/// [`PangeaError::Io`] when the folder cannot be created or written.
pub async fn save_as(file: &AttachedFile, folder: impl AsRef<Path>, filename: &str) -> Result<PathBuf> {
    let folder = folder.as_ref();
    tokio::fs::create_dir_all(folder).await.map_err(InfraError::from)?;

    let base = sanitize(filename)
        .unwrap_or_else(|| filename_for(None, None, Utc::now()));
    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 { base.clone() } else { numbered(&base, attempt) };
        let path = folder.join(&name);
        match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(handle) => {
                write_claimed(&path, handle, &file.content).await?;
                debug!(path = %path.display(), bytes = file.len(), "saved attached file");
                return Ok(path);
            }
            Err(err) if err.kind() == IoKind::AlreadyExists => {
                attempt = attempt.checked_add(1).ok_or_else(|| {
                    PangeaError::Io(format!("no free filename for {base} in {}", folder.display()))
                })?;
            }
            Err(err) => return Err(InfraError::from(err).into()),
        }
    }
}

/// Write `content` to a freshly created `path`; a partial file is removed
async fn write_claimed<W>(path: &Path, mut writer: W, content: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = match writer.write_all(content).await {
        Ok(()) => writer.flush().await,
        Err(err) => Err(err),
    };
    drop(writer);
    if let Err(err) = written {
        if let Err(cleanup) = tokio::fs::remove_file(path).await {
            debug!(path = %path.display(), error = %cleanup, "could not remove partial file");
        }
        return Err(InfraError::from(err).into());
    }
    Ok(())
}
