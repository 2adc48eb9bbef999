//! Icon download, resize and storage.
//!
//! [`FfmpegImageStore`] downloads the source icon into the temp directory
//! (reusing a cached copy younger than `ImageSpec::ttl_secs`), resizes it to every
//! target with `ffmpeg`, then either uploads each output with an HTTP `PUT`
//! to `{storage_base_url}/{engine_dir}/{file}` or moves it into
//! `{images_dir}/{engine_dir}/`.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::process::Command;

use appfeed_core::{ImageSpec, ImageTarget};

use crate::error::ImageError;

/// Where the resized outputs of one [`ImageSpec`] ended up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredImages {
    /// Upload URLs or local paths, one per target, in target order.
    pub locations: Vec<String>,
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// # Errors
    ///
    /// Any download, resize, or storage failure. Callers treat it as fatal
    /// for the current item only.
    async fn store(&self, spec: &ImageSpec) -> Result<StoredImages, ImageError>;
}

/// Skips all image work. Used for dry runs and `--no-images`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopImageStore;

#[async_trait]
impl ImageStore for NoopImageStore {
    async fn store(&self, _spec: &ImageSpec) -> Result<StoredImages, ImageError> {
        Ok(StoredImages::default())
    }
}

pub struct FfmpegImageStore {
    client: reqwest::Client,
    /// `None` keeps outputs on the local filesystem.
    remote_base_url: Option<String>,
    ffmpeg: PathBuf,
}

impl FfmpegImageStore {
    /// `remote_base_url` is only used when `save_to_remote_storage` is set.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        remote_base_url: Option<String>,
        save_to_remote_storage: bool,
    ) -> Self {
        Self {
            client,
            remote_base_url: remote_base_url
                .filter(|_| save_to_remote_storage)
                .map(|url| url.trim_end_matches('/').to_owned()),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }

    #[must_use]
    pub fn with_ffmpeg(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    /// Returns the local path of the source image, downloading it unless a
    /// temp copy younger than `spec.ttl_secs` already exists.
    pub(crate) async fn ensure_source(&self, spec: &ImageSpec) -> Result<PathBuf, ImageError> {
        create_dir(&spec.tmp_dir).await?;
        let tmp_path = spec.tmp_dir.join(&spec.tmp_file_name);

        if is_fresh(&tmp_path, Duration::from_secs(spec.ttl_secs)).await {
            tracing::debug!(path = %tmp_path.display(), "reusing cached source image");
            return Ok(tmp_path);
        }

        let response = self.client.get(&spec.source_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Download {
                url: spec.source_url.clone(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|source| io_error(&tmp_path, source))?;

        Ok(tmp_path)
    }

    async fn resize(
        &self,
        source: &Path,
        target: &ImageTarget,
        out_dir: &Path,
    ) -> Result<PathBuf, ImageError> {
        let out_path = out_dir.join(&target.file_name);
        let output = Command::new(&self.ffmpeg)
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(source.as_os_str())
            .arg("-vf")
            .arg(format!("scale={}:{}", target.width, target.height))
            .arg("-frames:v")
            .arg("1")
            .arg(out_path.as_os_str())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ImageError::Resize {
                file: target.file_name.clone(),
                reason: format!("failed to spawn {}: {e}", self.ffmpeg.display()),
            })?;

        if !output.status.success() {
            return Err(ImageError::Resize {
                file: target.file_name.clone(),
                reason: format!(
                    "ffmpeg exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(out_path)
    }

    /// `PUT`s one resized file under `{base}/{engine_dir}/{file_name}`.
    pub(crate) async fn upload(
        &self,
        base_url: &str,
        engine_dir: &str,
        file: &Path,
        file_name: &str,
    ) -> Result<String, ImageError> {
        let key = format!("{}/{file_name}", engine_dir.trim_matches('/'));
        let bytes = tokio::fs::read(file)
            .await
            .map_err(|source| io_error(file, source))?;

        let url = format!("{base_url}/{key}");
        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(bytes)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ImageError::Upload {
                key,
                status: response.status().as_u16(),
            });
        }
        Ok(url)
    }

    async fn store_locally(
        spec: &ImageSpec,
        file: &Path,
        file_name: &str,
    ) -> Result<String, ImageError> {
        let dir = spec.images_dir.join(&spec.engine_dir);
        create_dir(&dir).await?;
        let dest = dir.join(file_name);
        tokio::fs::copy(file, &dest)
            .await
            .map_err(|source| io_error(&dest, source))?;
        let _ = tokio::fs::remove_file(file).await;
        Ok(dest.display().to_string())
    }
}

#[async_trait]
impl ImageStore for FfmpegImageStore {
    async fn store(&self, spec: &ImageSpec) -> Result<StoredImages, ImageError> {
        let source = self.ensure_source(spec).await?;

        let mut locations = Vec::with_capacity(spec.targets.len());
        for target in &spec.targets {
            let resized = self.resize(&source, target, &spec.tmp_dir).await?;
            let location = match self.remote_base_url.as_deref() {
                Some(base) => {
                    let url = self
                        .upload(base, &spec.engine_dir, &resized, &target.file_name)
                        .await?;
                    let _ = tokio::fs::remove_file(&resized).await;
                    url
                }
                None => Self::store_locally(spec, &resized, &target.file_name).await?,
            };
            locations.push(location);
        }

        tracing::debug!(
            source = %spec.source_url,
            outputs = locations.len(),
            "stored resized images"
        );
        Ok(StoredImages { locations })
    }
}

async fn is_fresh(path: &Path, ttl: Duration) -> bool {
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return false;
    };
    if metadata.len() == 0 {
        return false;
    }
    metadata
        .modified()
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age < ttl)
}

async fn create_dir(dir: &Path) -> Result<(), ImageError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| io_error(dir, source))
}

fn io_error(path: &Path, source: std::io::Error) -> ImageError {
    ImageError::Io {
        path: path.display().to_string(),
        source,
    }
}
