//! The file-serving capability and its local disk implementation.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::file::FileInfo;
use crate::error::Result;

/// A request to download one file on behalf of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Identifier the rate limiter keys on
    pub client_id: String,
    /// Path relative to the served root
    pub path: String,
}

/// Trait for file-serving implementations.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Write the already opened `file` to `sink`, returning the number of bytes written.
    async fn serve_file(
        &self,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        request: &DownloadRequest,
        file: FileInfo,
    ) -> Result<u64>;
}

/// Streams files straight from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalDownloader;

#[async_trait]
impl Downloader for LocalDownloader {
    async fn serve_file(
        &self,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        request: &DownloadRequest,
        mut file: FileInfo,
    ) -> Result<u64> {
        let written = tokio::io::copy(file.file_mut(), sink).await?;
        sink.flush().await?;

        debug!(
            client_id = %request.client_id,
            path = %request.path,
            bytes = written,
            "Served file"
        );
        Ok(written)
    }
}
