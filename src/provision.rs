//! Download and cache the tf-profile release binary.
//!
//! Releases are cached under the system temp directory keyed by version, so
//! repeated runs (and the deploy/destroy pair within one run) download at
//! most once. The extracted binary is treated as immutable once in place.

use std::env;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::StageError;

/// Name of the tool, its cache directory, and the archive entry we extract.
pub const TOOL_NAME: &str = "tf-profile";

const RELEASE_BASE: &str = "https://github.com/datarootsio/tf-profile/releases/download";

/// Transport seam for fetching a release archive. The production
/// implementation is [`HttpFetcher`]; tests substitute in-memory archives.
pub trait Fetch {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, StageError>;
}

/// Fetches release archives over HTTPS.
#[derive(Debug, Default)]
pub struct HttpFetcher;

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, StageError> {
        let download_error = |detail: String| StageError::Download {
            url: url.to_string(),
            detail,
        };
        let mut response = ureq::get(url)
            .call()
            .map_err(|err| download_error(err.to_string()))?;
        let mut bytes = Vec::new();
        response
            .body_mut()
            .as_reader()
            .read_to_end(&mut bytes)
            .map_err(|err| download_error(err.to_string()))?;
        Ok(bytes)
    }
}

/// Resolves the tf-profile binary for the running platform, downloading and
/// extracting the release archive on first use.
pub struct Provisioner<F: Fetch> {
    cache_root: PathBuf,
    fetcher: F,
}

impl Default for Provisioner<HttpFetcher> {
    fn default() -> Self {
        Self {
            cache_root: env::temp_dir(),
            fetcher: HttpFetcher,
        }
    }
}

impl<F: Fetch> Provisioner<F> {
    pub fn with_fetcher(cache_root: PathBuf, fetcher: F) -> Self {
        Self { cache_root, fetcher }
    }

    /// Return the path to an executable tf-profile binary for `version`.
    /// Idempotent: a cache hit performs no network I/O.
    pub fn ensure_binary(&self, version: &str) -> Result<PathBuf, StageError> {
        self.ensure_binary_for(version, env::consts::OS, env::consts::ARCH)
    }

    fn ensure_binary_for(&self, version: &str, os: &str, arch: &str) -> Result<PathBuf, StageError> {
        let unsupported = || StageError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        };
        let os_label = os_label(os).ok_or_else(unsupported)?;
        let arch_label = arch_label(arch).ok_or_else(unsupported)?;

        let binary_path = self.cache_path(version);
        if binary_path.is_file() {
            tracing::debug!(path = %binary_path.display(), "tf-profile cache hit");
            set_executable(&binary_path)?;
            return Ok(binary_path);
        }

        let url = download_url(version, os_label, arch_label);
        tracing::info!(%url, path = %binary_path.display(), "downloading tf-profile release");
        let archive = self.fetcher.fetch(&url)?;
        extract_binary(&archive, &binary_path)?;
        set_executable(&binary_path)?;
        Ok(binary_path)
    }

    /// Deterministic per-version cache location:
    /// `<cache-root>/tf-profile/<version>/tf-profile`.
    pub fn cache_path(&self, version: &str) -> PathBuf {
        self.cache_root.join(TOOL_NAME).join(version).join(TOOL_NAME)
    }
}

fn os_label(os: &str) -> Option<&'static str> {
    match os {
        "linux" => Some("linux"),
        "windows" => Some("windows"),
        "macos" => Some("darwin"),
        _ => None,
    }
}

fn arch_label(arch: &str) -> Option<&'static str> {
    match arch {
        "x86_64" => Some("amd64"),
        "aarch64" => Some("arm64"),
        _ => None,
    }
}

fn download_url(version: &str, os_label: &str, arch_label: &str) -> String {
    format!("{RELEASE_BASE}/{version}/{TOOL_NAME}-{version}-{os_label}-{arch_label}.zip")
}

/// Extract the tf-profile entry from the release zip, writing to a temp file
/// and renaming into place so a second extractor never sees a partial binary.
fn extract_binary(archive: &[u8], dest: &Path) -> Result<(), StageError> {
    let mut zip = ZipArchive::new(Cursor::new(archive)).map_err(|err| StageError::Archive {
        detail: err.to_string(),
    })?;
    let mut entry = zip.by_name(TOOL_NAME).map_err(|err| StageError::Archive {
        detail: format!("no {TOOL_NAME} entry in archive: {err}"),
    })?;

    let parent = dest.parent().ok_or_else(|| StageError::Archive {
        detail: format!("cache path {} has no parent", dest.display()),
    })?;
    fs::create_dir_all(parent)
        .map_err(|err| StageError::io(format!("create {}", parent.display()), err))?;

    let staging = parent.join(format!(".{TOOL_NAME}.partial"));
    let mut out = fs::File::create(&staging)
        .map_err(|err| StageError::io(format!("create {}", staging.display()), err))?;
    io::copy(&mut entry, &mut out)
        .map_err(|err| StageError::io(format!("write {}", staging.display()), err))?;
    drop(out);
    fs::rename(&staging, dest)
        .map_err(|err| StageError::io(format!("publish {}", dest.display()), err))?;
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), StageError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o555))
        .map_err(|err| StageError::io(format!("chmod {}", path.display()), err))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), StageError> {
    Ok(())
}
