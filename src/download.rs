//! Resumable single-file download.

use std::path::Path;

use futures_util::StreamExt;
use log::warn;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWrite, AsyncWriteExt, SeekFrom};

use crate::client::CosClient;
use crate::error::{Error, Result};
use crate::types::DOWNLOAD_RETRIES;

impl CosClient {
    /// Download `remote` into `dest`, (re)starting at `start_offset`.
    ///
    /// The destination is opened once, truncated only when starting from
    /// offset 0, and written at explicit offsets, so re-entering at a
    /// nonzero offset never destroys bytes a previous attempt already
    /// wrote. A mid-body read error resumes from the current
    /// offset; attempts that make no forward progress are bounded by
    /// [`DOWNLOAD_RETRIES`]. A non-2xx response fails immediately.
    pub(crate) async fn download_file(
        &self,
        remote: &str,
        dest: &Path,
        start_offset: u64,
    ) -> Result<()> {
        let url = self.config.download_url(remote);

        let mut file: Option<tokio::fs::File> = None;
        let mut offset = start_offset;
        let mut stalled = 0u32;
        loop {
            let auth = self.signer.multi_signature();
            let response = self.transport.get_stream(&url, &auth, offset).await?;

            // Open the destination lazily, only once the service has
            // accepted the request; resume attempts reuse the handle.
            if file.is_none() {
                if let Some(parent) = dest.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent)
                            .await
                            .map_err(|e| Error::io(parent, e))?;
                    }
                }
                // A fresh download replaces whatever is at `dest`; a resume
                // must keep the bytes a previous attempt already wrote.
                let opened = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(start_offset == 0)
                    .open(dest)
                    .await
                    .map_err(|e| Error::io(dest, e))?;
                file = Some(opened);
            }
            let file = file.as_mut().expect("destination file just opened");

            file.seek(SeekFrom::Start(offset))
                .await
                .map_err(|e| Error::io(dest, e))?;

            let attempt_start = offset;
            let mut interrupted: Option<reqwest::Error> = None;
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        file.write_all(&bytes)
                            .await
                            .map_err(|e| Error::io(dest, e))?;
                        offset += bytes.len() as u64;
                    }
                    Err(e) => {
                        interrupted = Some(e);
                        break;
                    }
                }
            }

            let Some(cause) = interrupted else {
                file.flush().await.map_err(|e| Error::io(dest, e))?;
                return Ok(());
            };

            if offset > attempt_start {
                stalled = 0;
            } else {
                stalled += 1;
                if stalled >= DOWNLOAD_RETRIES {
                    return Err(Error::Transport(cause));
                }
            }
            warn!("download {remote}: body interrupted at byte {offset}, resuming ({cause})");
        }
    }

    /// Stream an object to an arbitrary writer (used by `cat`). No resume.
    pub(crate) async fn download_to_writer<W: AsyncWrite + Unpin>(
        &self,
        remote: &str,
        out: &mut W,
    ) -> Result<()> {
        let url = self.config.download_url(remote);
        let auth = self.signer.multi_signature();
        let response = self.transport.get_stream(&url, &auth, 0).await?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk?;
            out.write_all(&bytes)
                .await
                .map_err(|e| Error::io("<writer>", e))?;
        }
        out.flush().await.map_err(|e| Error::io("<writer>", e))?;
        Ok(())
    }
}
