use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::StatusCode;
use tokio::fs::File;
use tokio::io::AsyncWriteExt as _;
use url::Url;

use crate::error::{Error, Result, TransportError};
use crate::formats::AssetDescriptor;
use crate::store;
use crate::transport::{HttpExecutor, HttpResponse};

/// File extension for a declared content type. The table is closed on
/// purpose: anything else is rejected rather than guessed.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some(".jpg"),
        "video/mp4" => Some(".mp4"),
        _ => None,
    }
}

/// Downloads asset bodies into entry directories.
#[derive(Clone)]
pub struct AssetMaterializer {
    executor: Arc<dyn HttpExecutor>,
}

impl AssetMaterializer {
    pub fn new(executor: Arc<dyn HttpExecutor>) -> Self {
        Self { executor }
    }

    /// Streams the asset to `<dir>/<asset id><extension>`, replacing any
    /// existing file, and returns the written path.
    pub async fn materialize(&self, asset: &AssetDescriptor, dir: &Path) -> Result<PathBuf> {
        let extension =
            extension_for(&asset.content_type).ok_or_else(|| Error::UnsupportedContentType {
                content_type: asset.content_type.clone(),
            })?;

        let source = asset.source_url();
        let url = Url::parse(source).map_err(|source_err| {
            Error::transport(
                format!("asset {}", asset.id),
                TransportError::InvalidUrl {
                    url: source.to_owned(),
                    source: source_err,
                },
            )
        })?;

        let mut response = self
            .executor
            .get(&url)
            .await
            .map_err(|err| Error::transport(format!("download asset {}", asset.id), err))?;
        if response.status() != StatusCode::OK {
            return Err(Error::transport(
                format!("download asset {}", asset.id),
                TransportError::Status(response.status()),
            ));
        }

        let path = store::asset_path(dir, &asset.id, extension);
        let mut file = create_file(&path).await?;

        let copied = copy_body(&mut response, &mut file, &asset.id, &path).await;

        if let Err(err) = file.shutdown().await {
            tracing::error!(?err, path = %path.display(), "unable to close asset file");
        }
        drop(file);
        drop(response);

        if copied.is_err() {
            discard_partial(&path).await;
        }
        let bytes = copied?;
        tracing::info!(asset = %asset.id, path = %path.display(), bytes, "asset written");
        Ok(path)
    }
}

async fn create_file(path: &Path) -> Result<File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o666);
    options
        .open(path)
        .await
        .map_err(|err| Error::storage(format!("open asset file: {}", path.display()), err))
}

async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial asset file"),
        Err(err) => {
            tracing::warn!(?err, path = %path.display(), "unable to remove partial asset file");
        }
    }
}

async fn copy_body(
    response: &mut HttpResponse,
    file: &mut File,
    asset_id: &str,
    path: &Path,
) -> Result<u64> {
    let mut written = 0_u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| Error::transport(format!("read asset {asset_id}"), err))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|err| Error::storage(format!("write asset: {}", path.display()), err))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|err| Error::storage(format!("flush asset: {}", path.display()), err))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::stub::StubExecutor;

    fn asset(id: &str, kind: &str, content_type: &str) -> AssetDescriptor {
        AssetDescriptor {
            id: id.to_owned(),
            kind: kind.to_owned(),
            content_type: content_type.to_owned(),
            original_url: format!("https://cdn.test/original/{id}"),
            resized_url: format!("https://cdn.test/resized/{id}"),
        }
    }

    #[test]
    fn extension_table_is_closed() {
        assert_eq!(extension_for("image/jpeg"), Some(".jpg"));
        assert_eq!(extension_for("video/mp4"), Some(".mp4"));
        assert_eq!(extension_for("image/png"), None);
        assert_eq!(extension_for("IMAGE/JPEG"), None);
    }

    #[tokio::test]
    async fn jpeg_is_written_with_jpg_extension() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let executor = Arc::new(StubExecutor::default());
        executor.route("https://cdn.test/original/m1", 200, &[], b"jpeg-bytes");

        let materializer = AssetMaterializer::new(executor.clone());
        let path = materializer
            .materialize(&asset("m1", "image", "image/jpeg"), temp.path())
            .await?;

        assert_eq!(path, temp.path().join("m1.jpg"));
        assert_eq!(std::fs::read(&path)?, b"jpeg-bytes");
        Ok(())
    }

    #[tokio::test]
    async fn video_is_fetched_from_resized_url() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let executor = Arc::new(StubExecutor::default());
        executor.route("https://cdn.test/resized/v1", 200, &[], b"mp4-bytes");

        let materializer = AssetMaterializer::new(executor.clone());
        let path = materializer
            .materialize(&asset("v1", "video", "video/mp4"), temp.path())
            .await?;

        assert_eq!(path, temp.path().join("v1.mp4"));
        assert_eq!(executor.requests(), vec!["https://cdn.test/resized/v1"]);
        Ok(())
    }

    #[tokio::test]
    async fn existing_file_is_overwritten() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        std::fs::write(temp.path().join("m1.jpg"), b"a much longer stale payload")?;
        let executor = Arc::new(StubExecutor::default());
        executor.route("https://cdn.test/original/m1", 200, &[], b"fresh");

        AssetMaterializer::new(executor)
            .materialize(&asset("m1", "image", "image/jpeg"), temp.path())
            .await?;

        assert_eq!(std::fs::read(temp.path().join("m1.jpg"))?, b"fresh");
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_content_type_writes_nothing() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let executor = Arc::new(StubExecutor::default());

        let err = AssetMaterializer::new(executor.clone())
            .materialize(&asset("a1", "audio", "audio/mpeg"), temp.path())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedContentType { content_type } if content_type == "audio/mpeg"));
        assert!(executor.requests().is_empty());
        assert_eq!(std::fs::read_dir(temp.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn non_200_status_fails_without_file() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let executor = Arc::new(StubExecutor::default());
        executor.route("https://cdn.test/original/m1", 204, &[], b"");

        let err = AssetMaterializer::new(executor)
            .materialize(&asset("m1", "image", "image/jpeg"), temp.path())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Transport {
                source: TransportError::Status(StatusCode::NO_CONTENT),
                ..
            }
        ));
        assert_eq!(std::fs::read_dir(temp.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn interrupted_download_leaves_no_file() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        std::fs::write(temp.path().join("m1.jpg"), b"previous")?;
        let cancel = tokio_util::sync::CancellationToken::new();
        let executor = Arc::new(StubExecutor::with_cancellation(cancel.clone()));
        executor.route("https://cdn.test/original/m1", 200, &[], b"jpeg-bytes");
        cancel.cancel();

        let err = AssetMaterializer::new(executor.clone())
            .materialize(&asset("m1", "image", "image/jpeg"), temp.path())
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(executor.requests(), vec!["https://cdn.test/original/m1"]);
        assert!(!temp.path().join("m1.jpg").exists());
        Ok(())
    }

    #[tokio::test]
    async fn missing_directory_is_storage_error() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let executor = Arc::new(StubExecutor::default());
        executor.route("https://cdn.test/original/m1", 200, &[], b"x");

        let err = AssetMaterializer::new(executor)
            .materialize(
                &asset("m1", "image", "image/jpeg"),
                &temp.path().join("absent"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Storage { .. }));
        Ok(())
    }
}
