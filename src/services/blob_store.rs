//! src/services/blob_store.rs
//!
//! BlobStore — deterministic naming and local-disk storage for uploaded
//! artifacts and their derived thumbnails, plus time-limited signed read
//! URLs. Names follow
//! `{version}-{owner}-{project}-{version}{ext}`, sanitized, which makes a
//! blob name self-describing and collision-resistant across users and
//! projects while staying deterministic for a given (owner, project,
//! version) triple — re-uploading the same version overwrites the prior
//! blob.

use chrono::Utc;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid blob name `{0}`")]
    InvalidBlobName(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Local-disk blob store rooted at `base_path`.
///
/// Blob names are flat (no directories): the naming scheme already spreads
/// names across users and projects. `url_secret` signs read URLs.
#[derive(Clone)]
pub struct BlobStore {
    pub base_path: PathBuf,
    url_secret: String,
}

impl BlobStore {
    pub fn new(base_path: impl Into<PathBuf>, url_secret: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            url_secret: url_secret.into(),
        }
    }

    /// Reject names that could escape the storage directory.
    fn ensure_name_safe(&self, name: &str) -> BlobResult<()> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
            || name.bytes().any(|b| b.is_ascii_control())
        {
            return Err(BlobError::InvalidBlobName(name.to_string()));
        }
        Ok(())
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }

    /// Write a blob, overwriting any prior content under the same name.
    ///
    /// Writes to a temp file and renames into place so readers never see
    /// a partial payload.
    pub async fn put(&self, name: &str, bytes: &[u8]) -> BlobResult<()> {
        self.ensure_name_safe(name)?;
        fs::create_dir_all(&self.base_path).await?;

        let tmp_path = self.base_path.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;
        if let Err(err) = file.write_all(bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobError::Io(err));
        }

        let final_path = self.blob_path(name);
        if let Err(err) = fs::rename(&tmp_path, &final_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&final_path).await?;
                fs::rename(&tmp_path, &final_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(BlobError::Io(err));
            }
        }
        Ok(())
    }

    /// Open a blob for streaming out. Returns `None` if absent.
    pub async fn open(&self, name: &str) -> BlobResult<Option<File>> {
        self.ensure_name_safe(name)?;
        match File::open(self.blob_path(name)).await {
            Ok(file) => Ok(Some(file)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(BlobError::Io(err)),
        }
    }

    pub async fn exists(&self, name: &str) -> BlobResult<bool> {
        self.ensure_name_safe(name)?;
        Ok(fs::try_exists(self.blob_path(name)).await?)
    }

    /// Delete a blob. Returns `false` if it was already gone.
    pub async fn delete(&self, name: &str) -> BlobResult<bool> {
        self.ensure_name_safe(name)?;
        match fs::remove_file(self.blob_path(name)).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("blob {} already missing", name);
                Ok(false)
            }
            Err(err) => Err(BlobError::Io(err)),
        }
    }

    /// Mint a time-limited signed read URL for a blob.
    pub fn signed_url(&self, name: &str, expiry: Duration) -> String {
        let expires = Utc::now().timestamp() + expiry.as_secs() as i64;
        let sig = self.signature(name, expires);
        format!("/files/{name}?expires={expires}&sig={sig}")
    }

    /// Check a signed URL's signature and expiry.
    pub fn verify(&self, name: &str, expires: i64, sig: &str) -> bool {
        expires >= Utc::now().timestamp() && self.signature(name, expires) == sig
    }

    fn signature(&self, name: &str, expires: i64) -> String {
        format!(
            "{:x}",
            md5::compute(format!("{}:{}:{}", self.url_secret, name, expires))
        )
    }
}

/// Deterministic blob name for an uploaded artifact:
/// `{version}-{owner}-{project}-{version}{ext}`.
///
/// Only the local part of the owner email participates in the name.
pub fn blob_name(
    owner_email: &str,
    project_name: &str,
    version_number: i64,
    original_file_name: &str,
) -> String {
    let owner = sanitize(owner_email.split('@').next().unwrap_or(owner_email));
    let project = sanitize(project_name);
    let ext = extension(original_file_name);
    format!("{version_number}-{owner}-{project}-{version_number}{ext}")
}

/// Thumbnail name for a blob: extension replaced with `_thumb.jpg`.
/// Thumbnails are always JPEG regardless of the original format.
pub fn thumbnail_name(original_blob_name: &str) -> String {
    let stem = match original_blob_name.rfind('.') {
        Some(pos) => &original_blob_name[..pos],
        None => original_blob_name,
    };
    format!("{stem}_thumb.jpg")
}

/// Lowercase and replace every character outside `[A-Za-z0-9._-]` with `_`.
fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// File extension including the leading dot, lowercased; empty when absent.
pub fn extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}
