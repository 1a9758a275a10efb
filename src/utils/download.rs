//! Weights cache: resolve a URL to a local file, downloading it on a miss.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use hf_hub::{Cache, Repo, RepoType};
use indicatif::{ProgressBar, ProgressStyle};

const HUB_PREFIX: &str = "https://huggingface.co/";

/// Directory downloaded weights are stored in.
///
/// `$XDG_CACHE_HOME/imaginairy/weights`, else `$HOME/.cache/imaginairy/weights`,
/// else `.cached-downloads` inside the crate directory.
pub fn get_cache_dir() -> PathBuf {
    resolve_cache_dir(
        std::env::var_os("XDG_CACHE_HOME"),
        std::env::var_os("HOME"),
        &Path::new(env!("CARGO_MANIFEST_DIR")).join(".cached-downloads"),
    )
}

/// Cache directory resolution with the environment passed in explicitly.
///
/// Empty variables count as unset.
pub fn resolve_cache_dir(
    xdg_cache_home: Option<OsString>,
    home: Option<OsString>,
    fallback: &Path,
) -> PathBuf {
    let xdg_cache_home = xdg_cache_home
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            home.filter(|v| !v.is_empty())
                .map(|h| PathBuf::from(h).join(".cache"))
        });

    match xdg_cache_home {
        Some(base) => base.join("imaginairy").join("weights"),
        None => fallback.to_path_buf(),
    }
}

/// Local path for `url`, downloading it into [`get_cache_dir`] if needed
pub async fn get_cached_url_path(url: &str) -> crate::Result<PathBuf> {
    get_cached_url_path_in(url, get_cache_dir()).await
}

/// Local path for `url`, downloading it into `cache_dir` if needed.
///
/// Files already present in the Hugging Face hub cache are used in place.
/// Otherwise the file is stored as `<cache_dir>/<last URL segment>` and reused
/// on later calls. Nothing is verified; a present file is a hit.
pub async fn get_cached_url_path_in(
    url: &str,
    cache_dir: impl AsRef<Path>,
) -> crate::Result<PathBuf> {
    fetch_into(url, cache_dir.as_ref(), hub_dir().as_deref()).await
}

async fn fetch_into(
    url: &str,
    cache_dir: &Path,
    hub_root: Option<&Path>,
) -> crate::Result<PathBuf> {
    if let Some(path) = hub_root.and_then(|hub| hub_cached_path_in(url, hub)) {
        tracing::debug!("Found {} in hub cache at {:?}", url, path);
        return Ok(path);
    }

    let filename = url_filename(url).ok_or_else(|| {
        crate::ImaginairyError::DownloadError(format!("URL has no file name: {}", url))
    })?;

    std::fs::create_dir_all(cache_dir)?;
    let dest_path = cache_dir.join(filename);

    if dest_path.exists() {
        tracing::debug!("File {} already cached at {:?}", filename, dest_path);
        return Ok(dest_path);
    }

    let client = reqwest::Client::new();
    download_file(&client, url, &dest_path).await?;

    Ok(dest_path)
}

/// Last `/`-separated segment of `url`, if non-empty
fn url_filename(url: &str) -> Option<&str> {
    url.rsplit('/').next().filter(|name| !name.is_empty())
}

/// Split `https://huggingface.co/<repo>/resolve/<revision>/<file>` into its parts
fn parse_hub_url(url: &str) -> Option<(Repo, &str)> {
    let rest = url.strip_prefix(HUB_PREFIX)?;
    let (repo_id, rest) = rest.split_once("/resolve/")?;
    let (revision, filename) = rest.split_once('/')?;
    if repo_id.is_empty() || filename.is_empty() {
        return None;
    }

    let (repo_id, repo_type) = match repo_id.strip_prefix("datasets/") {
        Some(id) => (id, RepoType::Dataset),
        None => match repo_id.strip_prefix("spaces/") {
            Some(id) => (id, RepoType::Space),
            None => (repo_id, RepoType::Model),
        },
    };

    Some((
        Repo::with_revision(repo_id.to_string(), repo_type, revision.to_string()),
        filename,
    ))
}

/// `$HF_HOME/hub`, else `$HOME/.cache/huggingface/hub`
fn hub_dir() -> Option<PathBuf> {
    let hf_home = std::env::var_os("HF_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME")
                .filter(|v| !v.is_empty())
                .map(|h| PathBuf::from(h).join(".cache").join("huggingface"))
        })?;
    Some(hf_home.join("hub"))
}

/// Look the URL up in the Hugging Face hub cache rooted at `hub_dir`.
///
/// Any miss, including URLs that aren't hub URLs, yields `None`.
fn hub_cached_path_in(url: &str, hub_dir: &Path) -> Option<PathBuf> {
    let (repo, filename) = parse_hub_url(url)?;
    Cache::new(hub_dir.to_path_buf()).repo(repo).get(filename)
}

async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest_path: &Path,
) -> crate::Result<()> {
    tracing::info!("Downloading {} to {:?}", url, dest_path);

    let mut response = client.get(url).send().await.map_err(|e| {
        crate::ImaginairyError::DownloadError(format!("Failed to download {}: {}", url, e))
    })?;

    if !response.status().is_success() {
        return Err(crate::ImaginairyError::DownloadError(format!(
            "Failed to download {}: HTTP {}",
            url,
            response.status()
        )));
    }

    let pb = ProgressBar::new(response.content_length().unwrap_or(0));
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} {bytes}/{total_bytes} ({eta})")
    {
        pb.set_style(style);
    }

    // Write beside the target and rename so an interrupted download is never a cache hit
    let part_path = dest_path.with_extension(match dest_path.extension() {
        Some(ext) => format!("{}.part", ext.to_string_lossy()),
        None => "part".to_string(),
    });
    let mut content = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| {
        crate::ImaginairyError::DownloadError(format!("Download error: {}", e))
    })? {
        pb.inc(chunk.len() as u64);
        content.extend_from_slice(&chunk);
    }
    pb.finish_and_clear();

    if let Err(e) = write_then_rename(&part_path, dest_path, &content).await {
        let _ = tokio::fs::remove_file(&part_path).await;
        return Err(e.into());
    }

    tracing::info!("Downloaded {:?} ({} bytes)", dest_path, content.len());
    Ok(())
}

async fn write_then_rename(
    part_path: &Path,
    dest_path: &Path,
    content: &[u8],
) -> std::io::Result<()> {
    tokio::fs::write(part_path, content).await?;
    tokio::fs::rename(part_path, dest_path).await
}
