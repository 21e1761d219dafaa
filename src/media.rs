//! Movie attachments: streaming download and guarded upload with retries.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::{log_connection, SgError, SgResult};
use crate::fields::{field_map, is_empty_value, str_field, EntityRef, FieldMap};
use crate::filters::Filter;
use crate::session::Session;

/// Write buffer size for downloads.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Attachment field holding a version's movie.
pub const MOVIE_FIELD: &str = "sg_uploaded_movie";

/// Upload attempts before giving up. No backoff between attempts.
const UPLOAD_ATTEMPTS: usize = 10;

/// Stream `url` into `dest`, returning the number of bytes written.
///
/// # Errors
///
/// Returns `SgError::Api` for a non-2xx response.
pub async fn stream_download(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    chunk_size: usize,
) -> SgResult<u64> {
    let mut resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(SgError::api_status(
            status.as_u16(),
            format!("Download of {} failed", url),
        ));
    }

    let file = tokio::fs::File::create(dest).await?;
    let mut writer = BufWriter::with_capacity(chunk_size.max(1), file);
    let mut written = 0u64;
    while let Some(chunk) = resp.chunk().await? {
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    writer.flush().await?;

    tracing::debug!("Downloaded {} bytes to {}", written, dest.display());
    Ok(written)
}

/// The movie attached to an entity.
#[derive(Debug, Clone)]
pub struct Movie {
    session: Session,
    data: FieldMap,
    owner: Option<EntityRef>,
}

impl Movie {
    /// Wrap attachment data (`{name, url, ...}`); anything but an object is treated as empty.
    pub fn new(session: Session, data: Value, owner: Option<EntityRef>) -> Self {
        Self {
            session,
            data: field_map(data),
            owner,
        }
    }

    pub fn data(&self) -> &FieldMap {
        &self.data
    }

    pub fn name(&self) -> Option<&str> {
        str_field(&self.data, "name")
    }

    pub fn url(&self) -> Option<&str> {
        str_field(&self.data, "url")
    }

    /// The entity the movie is attached to.
    pub fn owner(&self) -> Option<&EntityRef> {
        self.owner.as_ref()
    }

    fn require_owner(&self) -> SgResult<&EntityRef> {
        self.owner
            .as_ref()
            .ok_or_else(|| SgError::validation("Movie is not attached to a saved entity"))
    }

    /// Download into `folder` (the working directory by default).
    ///
    /// Returns the target path; a failed write is logged, not raised.
    pub async fn download(&self, folder: Option<&Path>) -> SgResult<PathBuf> {
        let (name, url) = self
            .name()
            .zip(self.url())
            .ok_or_else(|| SgError::validation("Movie has no attachment to download"))?;
        let file_name = attachment_file_name(name)?;
        let dest = match folder {
            Some(folder) => folder.join(file_name),
            None => PathBuf::from(file_name),
        };

        log_connection(
            self.session.api().download(url, &dest).await,
            "download",
        )?;
        if !tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            tracing::error!("download failed: {}", dest.display());
        }
        Ok(dest)
    }

    /// Upload `path` into the owner's movie field.
    ///
    /// Returns `Ok(false)` without uploading when the file is missing or the
    /// field already holds an attachment. Vendor errors are retried up to ten
    /// times; other errors are returned immediately.
    pub async fn upload(&self, path: &Path) -> SgResult<bool> {
        if path.as_os_str().is_empty() || !tokio::fs::try_exists(path).await.unwrap_or(false) {
            tracing::error!("File not found: {}", path.display());
            return Ok(false);
        }

        let owner = self.require_owner()?;
        if self.check_attachment_exists(MOVIE_FIELD).await? {
            tracing::info!(
                "Attachment already exists for {} {}",
                owner.entity_type,
                owner.id
            );
            return Ok(false);
        }

        for attempt in 1..=UPLOAD_ATTEMPTS {
            let result = self
                .session
                .api()
                .upload(&owner.entity_type, owner.id, path, MOVIE_FIELD)
                .await;
            match result {
                Ok(true) => {
                    tracing::info!(
                        "Uploaded {} to {} {}",
                        path.display(),
                        owner.entity_type,
                        owner.id
                    );
                    return Ok(true);
                }
                Ok(false) => {
                    tracing::error!("Upload attempt {} returned no result", attempt);
                }
                Err(e) if e.is_vendor() => {
                    tracing::error!("Upload failed on attempt {}: {}", attempt, e);
                }
                Err(e) => return log_connection(Err(e), "upload"),
            }
            if attempt < UPLOAD_ATTEMPTS {
                tracing::info!("Retrying upload...");
            }
        }
        Ok(false)
    }

    /// Whether the owner's `field_name` already holds an attachment.
    ///
    /// An empty field name is never considered occupied.
    pub async fn check_attachment_exists(&self, field_name: &str) -> SgResult<bool> {
        if field_name.is_empty() {
            return Ok(false);
        }
        let owner = self.require_owner()?;
        let row = log_connection(
            self.session
                .api()
                .find_one(
                    &owner.entity_type,
                    &[Filter::is("id", owner.id)],
                    &[field_name],
                )
                .await,
            "check attachment",
        )?;
        let exists = row
            .as_ref()
            .and_then(|r| r.get(field_name))
            .is_some_and(|v| !is_empty_value(v));
        if exists {
            tracing::debug!(
                "File already exists for {} {} in field {}",
                owner.entity_type,
                owner.id,
                field_name
            );
        }
        Ok(exists)
    }
}

/// The bare file name of a server-supplied attachment name.
///
/// Directory components are dropped so the download stays inside the
/// requested folder. Names with `..` or no file component are rejected.
fn attachment_file_name(name: &str) -> SgResult<&OsStr> {
    let path = Path::new(name);
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(SgError::validation(format!("Invalid attachment name: {}", name)));
    }
    path.file_name()
        .ok_or_else(|| SgError::validation(format!("Invalid attachment name: {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryApi;
    use crate::config::Config;
    use crate::entities::Version;
    use serde_json::json;
    use std::io::Write;
    use std::sync::Arc;

    async fn version_fixture() -> (Arc<InMemoryApi>, Version) {
        let api = Arc::new(InMemoryApi::new());
        let session = Session::new(api.clone(), Config::new("https://site.example.com", "t", "k"));
        let project = session.create_project("Demo", FieldMap::new()).await.unwrap();
        let shot = project.create_shot("SH010", None, FieldMap::new()).await.unwrap();
        let version = shot
            .create_version("SH010_v001", None, FieldMap::new())
            .await
            .unwrap();
        (api, version)
    }

    fn movie_file(dir: &Path) -> PathBuf {
        let path = dir.join("SH010_v001.mov");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"not really a movie").unwrap();
        path
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let (api, mut version) = version_fixture().await;
        let src = tempfile::tempdir().unwrap();
        let path = movie_file(src.path());

        assert!(version.movie().upload(&path).await.unwrap());
        assert_eq!(api.upload_attempts(), 1);

        version.refetch(None).await.unwrap();
        let movie = version.movie();
        assert_eq!(movie.name(), Some("SH010_v001.mov"));

        let dest = tempfile::tempdir().unwrap();
        let out = movie.download(Some(dest.path())).await.unwrap();
        assert_eq!(out, dest.path().join("SH010_v001.mov"));
        assert_eq!(std::fs::read(&out).unwrap(), b"not really a movie");
    }

    #[tokio::test]
    async fn test_upload_skipped_when_attachment_exists() {
        let (api, version) = version_fixture().await;
        let src = tempfile::tempdir().unwrap();
        let path = movie_file(src.path());

        assert!(version.movie().upload(&path).await.unwrap());
        assert!(!version.movie().upload(&path).await.unwrap());
        assert_eq!(api.upload_attempts(), 1);
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let (api, version) = version_fixture().await;
        let uploaded = version
            .movie()
            .upload(Path::new("/definitely/not/here.mov"))
            .await
            .unwrap();
        assert!(!uploaded);
        assert_eq!(api.upload_attempts(), 0);
    }

    #[tokio::test]
    async fn test_upload_retries_vendor_errors() {
        let (api, version) = version_fixture().await;
        let src = tempfile::tempdir().unwrap();
        let path = movie_file(src.path());

        api.fail_uploads(3);
        assert!(version.movie().upload(&path).await.unwrap());
        assert_eq!(api.upload_attempts(), 4);
    }

    #[tokio::test]
    async fn test_upload_gives_up_after_ten_attempts() {
        let (api, version) = version_fixture().await;
        let src = tempfile::tempdir().unwrap();
        let path = movie_file(src.path());

        api.fail_uploads(usize::MAX);
        assert!(!version.movie().upload(&path).await.unwrap());
        assert_eq!(api.upload_attempts(), 10);
    }

    #[tokio::test]
    async fn test_download_stays_in_folder() {
        let (api, version) = version_fixture().await;
        let url = "memory://Version/1/sg_uploaded_movie/escaped.mov";
        api.put_blob(url, b"frames".to_vec());

        let elsewhere = tempfile::tempdir().unwrap();
        let absolute = elsewhere.path().join("escaped.mov");
        let data = json!({"name": absolute.to_str().unwrap(), "url": url});
        let movie = Movie::new(version.session().clone(), data, version.to_ref());

        let dest = tempfile::tempdir().unwrap();
        let out = movie.download(Some(dest.path())).await.unwrap();
        assert_eq!(out, dest.path().join("escaped.mov"));
        assert_eq!(std::fs::read(&out).unwrap(), b"frames");
        assert!(!absolute.exists());

        let data = json!({"name": "../escaped.mov", "url": url});
        let movie = Movie::new(version.session().clone(), data, version.to_ref());
        assert!(matches!(
            movie.download(Some(dest.path())).await,
            Err(SgError::Validation(_))
        ));
    }

    #[test]
    fn test_attachment_file_name() {
        assert_eq!(attachment_file_name("a/b/SH010.mov").unwrap(), "SH010.mov");
        assert_eq!(attachment_file_name("/abs/SH010.mov").unwrap(), "SH010.mov");
        assert!(attachment_file_name("..").is_err());
        assert!(attachment_file_name("/").is_err());
        assert!(attachment_file_name("").is_err());
    }

    #[tokio::test]
    async fn test_movie_without_attachment() {
        let (_api, version) = version_fixture().await;
        let movie = version.movie();
        assert!(movie.name().is_none());
        assert!(matches!(movie.download(None).await, Err(SgError::Validation(_))));
        assert!(!movie.check_attachment_exists("").await.unwrap());
    }
}
