use std::{fs::File, io::Write, path::{Path, PathBuf}, time::Duration};

use anyhow::{Context, Result};
use reqwest::{blocking::Client, redirect::Policy};
use tempfile::NamedTempFile;

/// Blocking byte fetcher for remote addresses.
///
/// Timeouts and HTTP error statuses both surface as `Err`; callers treat them alike.
pub trait Fetch {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// `Fetch` over a blocking reqwest client with a fixed per-request timeout.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(Policy::limited(10))
            .timeout(timeout)
            .build()
            .context("[common::download] Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url)
            .send()
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url} returned error status"))?;
        let bytes = resp.bytes().with_context(|| format!("GET {url} body"))?;
        Ok(bytes.to_vec())
    }
}

/// Returns true if `location` should be fetched rather than opened from disk.
pub(crate) fn is_remote(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Write-then-rename wrapper so a failed download never leaves a truncated target.
struct PendingWrite {
    target: PathBuf,
    tmp: NamedTempFile,
}

impl PendingWrite {
    fn open(target: &Path) -> Result<Self> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create dir {}", dir.display()))?;
        let tmp = NamedTempFile::new_in(dir).context("create temp file")?;
        Ok(Self { target: target.to_path_buf(), tmp })
    }

    fn finalize(self) -> Result<()> {
        self.tmp.as_file().sync_all().ok();
        self.tmp.persist(&self.target)
            .with_context(|| format!("rename to {}", self.target.display()))?;
        if let Some(dir) = self.target.parent() {
            let _ = File::open(dir).and_then(|f| f.sync_all());
        }
        Ok(())
    }
}

impl Write for PendingWrite {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> { self.tmp.write(buf) }
    fn flush(&mut self) -> std::io::Result<()> { self.tmp.flush() }
}

/// Fetch `url` into `out_path` atomically.
pub(crate) fn download_file(fetcher: &dyn Fetch, url: &str, out_path: &Path) -> Result<()> {
    let bytes = fetcher.fetch(url)?;
    let mut sink = PendingWrite::open(out_path)?;
    sink.write_all(&bytes).with_context(|| format!("write {}", out_path.display()))?;
    sink.finalize()
}

/// Read a local path or fetch a remote address.
pub(crate) fn read_location(fetcher: &dyn Fetch, location: &str) -> Result<Vec<u8>> {
    if is_remote(location) {
        fetcher.fetch(location)
    } else {
        std::fs::read(location).with_context(|| format!("read {location}"))
    }
}
