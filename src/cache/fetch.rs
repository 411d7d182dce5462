use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use log::{debug, info};
use rand::Rng;
use reqwest::{blocking::Client, header::CONTENT_TYPE, redirect::Policy};

use crate::{
    common::{fs::extract_zip, html::is_blocked_page},
    config::Config,
    error::{PullerError, Result},
};

use super::{url_key, write::PendingWrite};

/// Bytes of the response kept in memory to look for block fingerprints.
const SNIFF_LEN: usize = 64 * 1024;

/// Progress callback: (bytes so far, total if announced).
pub type Progress<'a> = &'a mut dyn FnMut(u64, Option<u64>);

/// Post-download step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decompress {
    None,
    /// Extract the archive into `<destination without extension>/`.
    Zip,
    /// Gunzip into `<destination without .gz>`.
    Gzip,
}

/// The "fetch URL -> bytes" primitive. The HTTP implementation is the default; tests and
/// alternative transports (browser-like fetchers) plug in here.
pub trait Transport: Send + Sync {
    /// Streams the body of `url` into `sink`, returning the response content type if known.
    fn download(&self, url: &str, sink: &mut dyn Write, progress: Progress<'_>) -> Result<Option<String>>;
}

/// Blocking reqwest transport.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(Policy::limited(10))
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn download(&self, url: &str, sink: &mut dyn Write, progress: Progress<'_>) -> Result<Option<String>> {
        let network = |reason: String| PullerError::Network { url: url.to_string(), reason };

        let mut resp = self.client.get(url).send().map_err(|e| network(e.to_string()))?;
        let status = resp.status();
        let content_type = resp.headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            // Some servers answer a crawler with an error status and a noindex page.
            let body = resp.text().unwrap_or_default();
            if is_blocked_page(&body) {
                return Err(PullerError::Blocked { url: url.to_string() });
            }
            return Err(network(format!("status {status}")));
        }

        let total = resp.content_length();
        let mut buf = vec![0u8; 64 * 1024];
        let mut done: u64 = 0;
        loop {
            let n = resp.read(&mut buf).map_err(|e| network(e.to_string()))?;
            if n == 0 { break }
            sink.write_all(&buf[..n])?;
            done += n as u64;
            progress(done, total);
        }
        Ok(content_type)
    }
}

/// Downloads into the cache with a polite delay between requests.
pub struct Fetcher {
    transport: Box<dyn Transport>,
    delay: (f64, f64),
    last_request: Mutex<Option<Instant>>,
}

impl Fetcher {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_transport(Box::new(HttpTransport::new(config)?), config.polite_delay))
    }

    pub fn with_transport(transport: Box<dyn Transport>, delay: (f64, f64)) -> Self {
        Self { transport, delay, last_request: Mutex::new(None) }
    }

    /// Sleeps so consecutive requests are spaced by a random delay in `self.delay`.
    fn polite_wait(&self) {
        let mut last = self.last_request.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = *last {
            let (lo, hi) = self.delay;
            let wait = if hi > lo { rand::rng().random_range(lo..hi) } else { lo };
            let wanted = Duration::from_secs_f64(wait);
            let elapsed = prev.elapsed();
            if elapsed < wanted {
                std::thread::sleep(wanted - elapsed);
            }
        }
        *last = Some(Instant::now());
    }

    /// Downloads `url` to `destination` atomically, then applies `decompress`.
    ///
    /// Returns the path of the usable artifact: the file itself, the extraction directory for
    /// zips, or the gunzipped file.
    pub fn fetch(&self, url: &str, destination: &Path, decompress: Decompress, progress: Option<Progress<'_>>)
        -> Result<PathBuf>
    {
        self.polite_wait();
        info!("[download] {url} -> {}", destination.display());

        let mut sink = Sniffer { inner: PendingWrite::open(destination)?, head: Vec::new() };
        let content_type = match progress {
            Some(p) => self.transport.download(url, &mut sink, p)?,
            None => self.transport.download(url, &mut sink, &mut |_, _| {})?,
        };
        sink.flush()?;

        let looks_html = content_type.as_deref().is_some_and(|t| t.contains("html"))
            || sink.head.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'<');
        if looks_html && is_blocked_page(&String::from_utf8_lossy(&sink.head)) {
            return Err(PullerError::Blocked { url: url.to_string() });
        }
        let path = sink.inner.finalize()?;

        match decompress {
            Decompress::None => Ok(path),
            Decompress::Zip => {
                let dir = path.with_extension("");
                info!("[extract] {} -> {}", path.display(), dir.display());
                // Extract beside the target and rename, so a crash never leaves a "ready" dir.
                let partial = path.with_extension("partial");
                if partial.exists() { std::fs::remove_dir_all(&partial)? }
                extract_zip(&path, &partial, false)?;
                if dir.exists() { std::fs::remove_dir_all(&dir)? }
                std::fs::rename(&partial, &dir)?;
                Ok(dir)
            }
            Decompress::Gzip => {
                let out = path.with_extension("");
                debug!("[gunzip] {} -> {}", path.display(), out.display());
                let mut decoder = flate2::read::GzDecoder::new(std::fs::File::open(&path)?);
                let mut pending = PendingWrite::open(&out)?;
                std::io::copy(&mut decoder, &mut pending)?;
                pending.finalize()
            }
        }
    }

    /// Content-addressed download: `<dir>/<sha256(url)>.<ext>`, skipped if already present.
    pub fn fetch_cached(&self, url: &str, dir: &Path, ext: &str, decompress: Decompress) -> Result<PathBuf> {
        let destination = dir.join(format!("{}.{ext}", url_key(url)));
        let ready = match decompress {
            Decompress::None => destination.clone(),
            Decompress::Zip | Decompress::Gzip => destination.with_extension(""),
        };
        if ready.exists() {
            debug!("[download] cached {url} at {}", ready.display());
            return Ok(ready);
        }
        self.fetch(url, &destination, decompress, None)
    }

    /// Fetches a page as text (for scraping); block pages raise `Blocked`.
    pub fn fetch_text(&self, url: &str) -> Result<String> {
        self.polite_wait();
        debug!("[scrape] {url}");
        let mut body = Vec::new();
        self.transport.download(url, &mut body, &mut |_, _| {})?;
        let text = String::from_utf8_lossy(&body).into_owned();
        if is_blocked_page(&text) {
            return Err(PullerError::Blocked { url: url.to_string() });
        }
        Ok(text)
    }
}

/// Tee writer remembering the first bytes of the stream.
struct Sniffer {
    inner: PendingWrite,
    head: Vec<u8>,
}

impl Write for Sniffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        let room = SNIFF_LEN.saturating_sub(self.head.len());
        self.head.extend_from_slice(&buf[..n.min(room)]);
        Ok(n)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
