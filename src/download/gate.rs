//! Rate-limited wrapper around a [`Downloader`].

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tracing::trace;

use super::downloader::{DownloadRequest, Downloader};
use super::file::FileInfo;
use crate::error::Result;
use crate::ratelimit::AccessControl;

/// What happened to a gated download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The file was written, carrying the byte count
    Served(u64),
    /// The client is over its limit; nothing was written
    Throttled,
}

/// Consults an admission policy before handing a request to the downloader.
pub struct GatedDownloader<A, D> {
    control: Arc<A>,
    downloader: D,
}

impl<A: AccessControl, D: Downloader> GatedDownloader<A, D> {
    pub fn new(control: Arc<A>, downloader: D) -> Self {
        Self {
            control,
            downloader,
        }
    }

    /// The admission policy this gate consults.
    pub fn control(&self) -> &Arc<A> {
        &self.control
    }

    /// Charge the request's client against the admission policy.
    ///
    /// `Ok(false)` means throttled. Capacity errors propagate unchanged.
    pub fn admit(&self, request: &DownloadRequest) -> Result<bool> {
        let allowed = self.control.access(&request.client_id)?;
        trace!(client_id = %request.client_id, allowed, "Admission decision");
        Ok(allowed)
    }

    /// Serve an admitted request from a file that is already open.
    pub async fn serve(
        &self,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        request: &DownloadRequest,
        file: FileInfo,
    ) -> Result<u64> {
        self.downloader.serve_file(sink, request, file).await
    }

    /// Admit and serve in one step.
    ///
    /// Taking an opened [`FileInfo`] means a client is only charged once the
    /// file is known to be readable.
    pub async fn download(
        &self,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        request: &DownloadRequest,
        file: FileInfo,
    ) -> Result<DownloadOutcome> {
        if !self.admit(request)? {
            return Ok(DownloadOutcome::Throttled);
        }
        let written = self.serve(sink, request, file).await?;
        Ok(DownloadOutcome::Served(written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::LocalDownloader;
    use crate::error::TollgateError;
    use crate::ratelimit::{Limiter, ManualClock};
    use tempfile::TempDir;

    fn request(client_id: &str) -> DownloadRequest {
        DownloadRequest {
            client_id: client_id.to_string(),
            path: "file.txt".to_string(),
        }
    }

    fn gate(capacity: usize, tokens: u64) -> GatedDownloader<Limiter, LocalDownloader> {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = Limiter::with_clock(capacity, 60, tokens, clock).unwrap();
        GatedDownloader::new(Arc::new(limiter), LocalDownloader)
    }

    fn root_with(contents: &[u8]) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("file.txt"), contents).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_download_until_throttled() {
        let dir = root_with(b"payload");
        let gate = gate(4, 1);

        let mut sink = Vec::new();
        let mut outcomes = Vec::new();
        for _ in 0..3 {
            let file = FileInfo::resolve(dir.path(), "file.txt").await.unwrap();
            outcomes.push(gate.download(&mut sink, &request("alice"), file).await.unwrap());
        }

        assert_eq!(
            outcomes,
            [
                DownloadOutcome::Served(7),
                DownloadOutcome::Served(7),
                DownloadOutcome::Throttled
            ]
        );
        assert_eq!(sink, b"payloadpayload");
    }

    #[tokio::test]
    async fn test_download_capacity_error_propagates() {
        let dir = root_with(b"x");
        let gate = gate(1, 1);

        let mut sink = Vec::new();
        let file = FileInfo::resolve(dir.path(), "file.txt").await.unwrap();
        gate.download(&mut sink, &request("alice"), file).await.unwrap();

        let file = FileInfo::resolve(dir.path(), "file.txt").await.unwrap();
        let err = gate
            .download(&mut sink, &request("bob"), file)
            .await
            .unwrap_err();

        assert!(matches!(err, TollgateError::CapacityExceeded { capacity: 1 }));
        assert_eq!(gate.control().size(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_admitted_download_survives_removal_after_resolve() {
        let dir = root_with(b"payload");
        let gate = gate(4, 1);

        let file = FileInfo::resolve(dir.path(), "file.txt").await.unwrap();
        std::fs::remove_file(dir.path().join("file.txt")).unwrap();

        let mut sink = Vec::new();
        let outcome = gate.download(&mut sink, &request("alice"), file).await.unwrap();

        assert_eq!(outcome, DownloadOutcome::Served(7));
        assert_eq!(sink, b"payload");
        assert_eq!(gate.control().size(), 1);
    }

    struct DenyAll;

    impl AccessControl for DenyAll {
        fn access(&self, _id: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_custom_access_control() {
        let dir = root_with(b"x");
        let gate = GatedDownloader::new(Arc::new(DenyAll), LocalDownloader);
        let file = FileInfo::resolve(dir.path(), "file.txt").await.unwrap();

        let mut sink = Vec::new();
        let outcome = gate.download(&mut sink, &request("anyone"), file).await.unwrap();
        assert_eq!(outcome, DownloadOutcome::Throttled);
        assert!(sink.is_empty());
    }
}
