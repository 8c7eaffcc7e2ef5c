//! Release source archive: download, checksum, unpack

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use futures::StreamExt;
use log::{info, warn};
use sha2::{Digest, Sha256};
use tar::Archive;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use crate::config::SourceConfig;
use crate::error::{InstallerError, Result};

const DOWNLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300); // 5 min no data

/// A release tarball pinned by checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceArchive {
    pub url: String,
    pub version: String,
    pub sha256: String,
}

impl From<&SourceConfig> for SourceArchive {
    fn from(config: &SourceConfig) -> Self {
        Self {
            url: config.url.clone(),
            version: config.version.clone(),
            sha256: config.sha256.to_ascii_lowercase(),
        }
    }
}

impl SourceArchive {
    /// Last path segment of the URL
    pub fn file_name(&self) -> String {
        self.url
            .rsplit('/')
            .find(|s| !s.is_empty())
            .map(|s| s.split(['?', '#']).next().unwrap_or(s).to_string())
            .unwrap_or_else(|| format!("lantern-v{}-source.tar.gz", self.version))
    }

    /// Compare a digest against the pinned checksum
    pub fn check_digest(&self, actual: &str) -> Result<()> {
        if actual.eq_ignore_ascii_case(&self.sha256) {
            Ok(())
        } else {
            Err(InstallerError::ChecksumMismatch {
                url: self.url.clone(),
                expected: self.sha256.clone(),
                actual: actual.to_string(),
            })
        }
    }

    pub fn verify_file(&self, path: &Path) -> Result<()> {
        self.check_digest(&sha256_file(path)?)
    }

    /// Stream the archive into `dest_dir`, hashing as it arrives
    ///
    /// The file is removed again if the transfer fails or the checksum does
    /// not match.
    pub async fn download(&self, dest_dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| InstallerError::io(dest_dir, e))?;
        let path = dest_dir.join(self.file_name());

        let client = reqwest::Client::builder()
            .connect_timeout(DOWNLOAD_CONNECT_TIMEOUT)
            .user_agent(concat!("lantern-install/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InstallerError::Download(e.to_string()))?;
        let response = client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| InstallerError::Download(format!("{}: {e}", self.url)))?;

        info!("Downloading {}", self.url);
        let streamed = stream_to_file(response, &path).await;
        let checked = streamed.and_then(|(digest, downloaded)| {
            self.check_digest(&digest).map(|()| downloaded)
        });
        let downloaded = match checked {
            Ok(downloaded) => downloaded,
            Err(e) => {
                warn!("Removing {} after failed download", path.display());
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e);
            }
        };

        info!("Downloaded {downloaded} bytes to {}", path.display());
        Ok(path)
    }

    /// Download, verify and unpack into `dest_dir`; returns the source root
    pub async fn fetch(&self, dest_dir: &Path) -> Result<PathBuf> {
        let archive = self.download(dest_dir).await?;
        unpack(&archive, dest_dir).await
    }
}

/// Write the body to `path`; returns the hex digest and byte count
async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<(String, u64)> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| InstallerError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    loop {
        let chunk = match timeout(DOWNLOAD_INACTIVITY_TIMEOUT, stream.next()).await {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(e))) => return Err(InstallerError::Download(e.to_string())),
            Ok(None) => break,
            Err(_) => {
                return Err(InstallerError::Download(format!(
                    "no data received for {} seconds after {downloaded} bytes",
                    DOWNLOAD_INACTIVITY_TIMEOUT.as_secs()
                )));
            }
        };
        hasher.update(&chunk);
        file.write_all(&chunk)
            .await
            .map_err(|e| InstallerError::io(path, e))?;
        downloaded += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| InstallerError::io(path, e))?;

    Ok((hex::encode(hasher.finalize()), downloaded))
}

/// Hex SHA-256 of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| InstallerError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| InstallerError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Unpack a `.tar.gz` into `dest_dir`
///
/// Returns the archive's single top-level directory when it has one,
/// otherwise `dest_dir` itself.
pub async fn unpack(archive: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let archive = archive.to_path_buf();
    let dest = dest_dir.to_path_buf();

    tokio::task::spawn_blocking(move || unpack_blocking(&archive, &dest))
        .await
        .map_err(|e| InstallerError::io(dest_dir, io::Error::other(e)))?
}

fn unpack_blocking(archive_path: &Path, dest: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dest).map_err(|e| InstallerError::io(dest, e))?;
    let file = File::open(archive_path).map_err(|e| InstallerError::io(archive_path, e))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let mut roots = BTreeSet::new();
    let mut root_is_dir = true;

    let entries = archive
        .entries()
        .map_err(|e| InstallerError::io(archive_path, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| InstallerError::io(archive_path, e))?;
        let path = entry
            .path()
            .map_err(|e| InstallerError::io(archive_path, e))?
            .into_owned();

        let mut components = path
            .components()
            .filter(|c| matches!(c, Component::Normal(_)));
        if let Some(first) = components.next() {
            roots.insert(PathBuf::from(first.as_os_str()));
            if components.next().is_none() && !entry.header().entry_type().is_dir() {
                root_is_dir = false;
            }
        }

        // unpack_in refuses paths that escape dest
        entry
            .unpack_in(dest)
            .map_err(|e| InstallerError::io(dest.join(&path), e))?;
    }

    let root = match (roots.len(), roots.into_iter().next()) {
        (1, Some(only)) if root_is_dir => dest.join(only),
        _ => dest.to_path_buf(),
    };
    info!("Unpacked {} into {}", archive_path.display(), root.display());
    Ok(root)
}
