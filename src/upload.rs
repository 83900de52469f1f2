//! Upload paths: single-shot multipart for small files, the three-phase
//! slice session for large ones.

use std::path::Path;

use log::{debug, info};
use reqwest::multipart::{Form, Part};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

use crate::client::CosClient;
use crate::error::{Error, Result};
use crate::pool::WorkerPool;
use crate::transport::SliceInitData;
use crate::types::{SliceTask, UploadSession, MAX_SINGLE_SIZE, SLICE_SIZE};

/// Split `[0, total_size)` into contiguous tasks of at most `slice_size`
/// bytes, in file order.
pub(crate) fn partition_slices(total_size: u64, slice_size: u64) -> Vec<SliceTask> {
    let slice_size = slice_size.max(1);
    let mut tasks = Vec::with_capacity(total_size.div_ceil(slice_size) as usize);
    let mut offset = 0;
    while offset < total_size {
        let length = slice_size.min(total_size - offset);
        tasks.push(SliceTask { offset, length });
        offset += length;
    }
    tasks
}

fn insert_only(overwrite: bool) -> &'static str {
    if overwrite {
        "0"
    } else {
        "1"
    }
}

fn file_name_of(remote: &str) -> String {
    remote.rsplit('/').next().unwrap_or(remote).to_string()
}

impl CosClient {
    /// Upload one local file, branching on size between the single-shot
    /// request and the slice session.
    pub(crate) async fn push_file_inner(
        &self,
        local: &Path,
        remote: &str,
        overwrite: bool,
    ) -> Result<()> {
        let metadata = tokio::fs::metadata(local)
            .await
            .map_err(|e| Error::io(local, e))?;
        if metadata.len() > MAX_SINGLE_SIZE {
            self.upload_sliced(local, remote, metadata.len(), SLICE_SIZE, overwrite)
                .await
        } else {
            self.upload_small(local, remote, overwrite).await
        }
    }

    /// Whole file in one `op=upload` multipart request.
    pub(crate) async fn upload_small(
        &self,
        local: &Path,
        remote: &str,
        overwrite: bool,
    ) -> Result<()> {
        let bytes = tokio::fs::read(local)
            .await
            .map_err(|e| Error::io(local, e))?;
        let sha = hex::encode(Sha256::digest(&bytes));

        let form = Form::new()
            .text("op", "upload")
            .text("sha", sha)
            .text("insertOnly", insert_only(overwrite))
            .part(
                "filecontent",
                Part::bytes(bytes).file_name(file_name_of(remote)),
            );

        let url = self.config.api_url(remote);
        let auth = self.signer.multi_signature();
        let response = self
            .transport
            .post_multipart::<serde_json::Value>(&url, &auth, form)
            .await?;
        response.ensure_ok()
    }

    /// Three-phase slice upload: init a session, push slices in parallel
    /// under the slice pool, finish only when every slice succeeded.
    ///
    /// A slice failure skips the finish step but never cancels in-flight
    /// siblings; every dispatched slice is drained before this returns.
    pub(crate) async fn upload_sliced(
        &self,
        local: &Path,
        remote: &str,
        total_size: u64,
        slice_size: u64,
        overwrite: bool,
    ) -> Result<()> {
        let url = self.config.api_url(remote);
        let auth = self.signer.multi_signature();

        // Phase 1: init.
        let init_form = Form::new()
            .text("op", "upload_slice_init")
            .text("filesize", total_size.to_string())
            .text("slice_size", slice_size.to_string())
            .text("insertOnly", insert_only(overwrite));
        let init = self
            .transport
            .post_multipart::<SliceInitData>(&url, &auth, init_form)
            .await?
            .into_data()?;

        let session = UploadSession {
            url: init.url.unwrap_or_else(|| url.clone()),
            session: init.session,
            total_size,
            slice_size,
        };
        info!(
            "slice upload {remote}: session {} ({total_size} bytes, {slice_size} per slice)",
            session.session
        );

        // Phase 2: slices, bounded by the slice pool. Permits are acquired
        // before spawning, so dispatch itself is throttled.
        let tasks = partition_slices(total_size, slice_size);
        let pool = WorkerPool::new(self.config.slice_workers());
        let mut handles = Vec::with_capacity(tasks.len());
        for task in tasks {
            let permit = pool.acquire().await;
            let client = self.clone();
            let session = session.clone();
            let local = local.to_path_buf();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                client.upload_slice(&local, &session, task).await
            }));
        }

        let mut first_error: Option<Error> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(Error::Worker(e.to_string()));
                }
            }
        }
        if let Some(error) = first_error {
            debug!("slice upload {remote}: aborting before finish: {error}");
            return Err(error);
        }

        // Phase 3: finish.
        let finish_form = Form::new()
            .text("op", "upload_slice_finish")
            .text("session", session.session.clone())
            .text("filesize", total_size.to_string());
        let auth = self.signer.multi_signature();
        self.transport
            .post_multipart::<serde_json::Value>(&session.url, &auth, finish_form)
            .await?
            .ensure_ok()
    }

    /// One `op=upload_slice_data` request carrying the slice bytes.
    async fn upload_slice(
        &self,
        local: &Path,
        session: &UploadSession,
        task: SliceTask,
    ) -> Result<()> {
        let mut file = File::open(local).await.map_err(|e| Error::io(local, e))?;
        file.seek(SeekFrom::Start(task.offset))
            .await
            .map_err(|e| Error::io(local, e))?;
        let mut buffer = vec![0u8; task.length as usize];
        file.read_exact(&mut buffer)
            .await
            .map_err(|e| Error::io(local, e))?;

        let form = Form::new()
            .text("op", "upload_slice_data")
            .text("session", session.session.clone())
            .text("offset", task.offset.to_string())
            .part("filecontent", Part::bytes(buffer).file_name("filecontent"));

        let auth = self.signer.multi_signature();
        self.transport
            .post_multipart::<serde_json::Value>(&session.url, &auth, form)
            .await?
            .ensure_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::test_client;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ok_body() -> serde_json::Value {
        serde_json::json!({"code": 0, "message": ""})
    }

    #[test]
    fn partition_covers_range_without_gaps_or_overlaps() {
        for (total, slice) in [(10u64, 4u64), (12, 4), (1, 4), (4, 4), (7_340_033, 1 << 20)] {
            let tasks = partition_slices(total, slice);
            let mut expected_offset = 0;
            for task in &tasks {
                assert_eq!(task.offset, expected_offset);
                assert!(task.length <= slice);
                assert!(task.length > 0);
                expected_offset += task.length;
            }
            assert_eq!(expected_offset, total);
        }
    }

    #[test]
    fn partition_last_slice_is_remainder_or_full() {
        let tasks = partition_slices(10, 4);
        assert_eq!(tasks.last().unwrap().length, 10 % 4);
        let exact = partition_slices(12, 4);
        assert_eq!(exact.last().unwrap().length, 4);
        assert!(partition_slices(0, 4).is_empty());
    }

    #[test]
    fn partition_with_zero_slice_size_terminates() {
        let tasks = partition_slices(3, 0);
        assert_eq!(tasks.len(), 3);
        assert!(tasks.iter().all(|t| t.length == 1));
    }

    #[tokio::test]
    async fn small_file_issues_exactly_one_upload_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/v2/100/bkt/docs/note.txt"))
            .and(body_string_contains("upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("note.txt");
        std::fs::write(&local, b"hello").unwrap();

        let client = test_client(&server.uri());
        client
            .push_file_inner(&local, "/docs/note.txt", true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sliced_upload_runs_init_then_slices_then_finish() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("upload_slice_init"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "message": "", "data": {"session": "sess-1"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("upload_slice_data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("upload_slice_finish"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("big.bin");
        std::fs::write(&local, b"0123456789").unwrap();

        let client = test_client(&server.uri());
        client
            .upload_sliced(&local, "/big.bin", 10, 4, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn slice_failure_drains_siblings_and_skips_finish() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("upload_slice_init"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0, "message": "", "data": {"session": "sess-2"}
            })))
            .mount(&server)
            .await;
        // Every slice reports a non-zero code.
        Mock::given(method("POST"))
            .and(body_string_contains("upload_slice_data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": -288, "message": "slice rejected"
            })))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("upload_slice_finish"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("big.bin");
        std::fs::write(&local, b"0123456789").unwrap();

        let client = test_client(&server.uri());
        let err = client
            .upload_sliced(&local, "/big.bin", 10, 4, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote { code: -288, .. }));
    }
}
