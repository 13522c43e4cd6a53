//! File download collaborator gated by the rate limiter.

mod downloader;
mod file;
mod gate;

pub use downloader::{DownloadRequest, Downloader, LocalDownloader};
pub use file::FileInfo;
pub use gate::{DownloadOutcome, GatedDownloader};
