use crate::error::{Result, UpdaterError};
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const DEFAULT_MANIFEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);
const USER_AGENT: &str = concat!("launcher-updater/", env!("CARGO_PKG_VERSION"));

/// Progress callback: `(bytes_done, bytes_total)`, `bytes_total == 0` when
/// the server did not announce a length.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// Abstraction over where release data comes from.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Fetch the raw manifest body.
    async fn fetch_manifest(&self, url: &str) -> Result<Vec<u8>>;

    /// Stream one artifact body to `dest`, reporting progress after each
    /// chunk. Implementations must not buffer the whole body in memory.
    async fn download(&self, url: &str, dest: &Path, progress: ProgressFn<'_>) -> Result<()>;
}

/// Builder for [`HttpSource`].
#[derive(Default)]
pub struct HttpSourceBuilder {
    manifest_timeout: Option<Duration>,
    transfer_timeout: Option<Duration>,
    client: Option<Client>,
}

impl HttpSourceBuilder {
    /// Bound the manifest request (default 10s).
    pub fn manifest_timeout(mut self, timeout: Duration) -> Self {
        self.manifest_timeout = Some(timeout);
        self
    }

    /// Bound each artifact transfer end to end (default 300s), so a stalled
    /// connection cannot leave the observer stuck mid-download.
    pub fn transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = Some(timeout);
        self
    }

    /// Provide a custom reqwest client instance.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the source.
    pub fn build(self) -> Result<HttpSource> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(USER_AGENT)
                .connect_timeout(Duration::from_secs(10))
                .build()?,
        };

        Ok(HttpSource {
            client,
            manifest_timeout: self.manifest_timeout.unwrap_or(DEFAULT_MANIFEST_TIMEOUT),
            transfer_timeout: self.transfer_timeout.unwrap_or(DEFAULT_TRANSFER_TIMEOUT),
        })
    }
}

/// HTTPS-backed release source.
#[derive(Clone)]
pub struct HttpSource {
    client: Client,
    manifest_timeout: Duration,
    transfer_timeout: Duration,
}

impl HttpSource {
    /// Create a new builder.
    pub fn builder() -> HttpSourceBuilder {
        HttpSourceBuilder::default()
    }
}

#[async_trait]
impl UpdateSource for HttpSource {
    async fn fetch_manifest(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .timeout(self.manifest_timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|err| UpdaterError::Manifest(format!("fetch of {url} failed: {err}")))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|err| UpdaterError::Manifest(format!("read of {url} failed: {err}")))?;
        Ok(bytes.to_vec())
    }

    async fn download(&self, url: &str, dest: &Path, progress: ProgressFn<'_>) -> Result<()> {
        let mut response = self
            .client
            .get(url)
            .timeout(self.transfer_timeout)
            .send()
            .await?
            .error_for_status()?;

        let total = response.content_length().unwrap_or(0);
        let mut done: u64 = 0;
        let mut file = tokio::fs::File::create(dest).await?;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            done += chunk.len() as u64;
            progress(done, total);
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}
