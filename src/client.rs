//! Transfer engine composition root: one client value owning the signer,
//! transport, and pool sizing, exposing the CLI-facing operations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info};
use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;

use crate::config::{normalize_remote, CosConfig};
use crate::error::{Error, Result};
use crate::list::Paginator;
use crate::pool::WorkerPool;
use crate::signer::Signer;
use crate::transport::Transport;
use crate::types::{report, RemoteEntry, TransferOutcome};
use crate::walk::{walk_local, walk_remote, TreeVisitor};

/// Client for one bucket. Cheap to clone; clones share the HTTP connection
/// pool and the signature cache.
#[derive(Clone)]
pub struct CosClient {
    pub(crate) config: Arc<CosConfig>,
    pub(crate) signer: Signer,
    pub(crate) transport: Transport,
}

impl CosClient {
    pub fn new(config: CosConfig) -> Result<CosClient> {
        let signer = Signer::new(&config);
        let transport = Transport::new()?;
        Ok(CosClient {
            config: Arc::new(config),
            signer,
            transport,
        })
    }

    /// All entries of one remote directory, pages concatenated in fetch
    /// order.
    pub async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let path = normalize_remote(path);
        let pager = Paginator::new(self);
        let mut entries = Vec::new();
        let mut cursor = String::new();
        loop {
            let page = pager.fetch_page(&path, &cursor).await?;
            entries.extend(page.entries);
            if page.is_last {
                break;
            }
            cursor = page.cursor;
        }
        Ok(entries)
    }

    /// Raw `op=stat` metadata for one remote path.
    pub async fn stat(&self, path: &str) -> Result<serde_json::Value> {
        let path = normalize_remote(path);
        let url = format!("{}?op=stat", self.config.api_url(&path));
        let auth = self.signer.multi_signature();
        self.transport
            .get_json::<serde_json::Value>(&url, &auth)
            .await?
            .into_data()
    }

    /// Upload a local file or directory tree under `remote`. Returns the
    /// number of files that failed; per-file failures never halt siblings.
    pub async fn upload(&self, local: &Path, remote: &str, overwrite: bool) -> Result<usize> {
        let remote = normalize_remote(remote);
        let metadata = tokio::fs::metadata(local)
            .await
            .map_err(|e| Error::io(local, e))?;
        if metadata.is_dir() {
            return self.upload_tree(local, &remote, overwrite).await;
        }
        let remote = if remote.ends_with('/') {
            let name = local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{remote}{name}")
        } else {
            remote
        };
        let outcome = self.push_file(local, &remote, overwrite).await;
        report(&outcome);
        Ok(usize::from(!outcome.success))
    }

    async fn upload_tree(&self, local: &Path, remote: &str, overwrite: bool) -> Result<usize> {
        let prefix = if remote.ends_with('/') {
            remote.to_string()
        } else {
            format!("{remote}/")
        };
        let files = walk_local(local).await?;
        info!("pushing {} files under {prefix}", files.len());

        let pool = WorkerPool::new(self.config.transfer_workers());
        let mut tasks: Vec<JoinHandle<bool>> = Vec::with_capacity(files.len());
        for file in files {
            let permit = pool.acquire().await;
            let client = self.clone();
            let target = format!("{prefix}{}", file.rel);
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = client.push_file(&file.path, &target, overwrite).await;
                report(&outcome);
                outcome.success
            }));
        }
        drain_outcomes(tasks).await
    }

    pub(crate) async fn push_file(
        &self,
        local: &Path,
        remote: &str,
        overwrite: bool,
    ) -> TransferOutcome {
        match self.push_file_inner(local, remote, overwrite).await {
            Ok(()) => TransferOutcome::ok(remote),
            Err(e) => TransferOutcome::fail(remote, e),
        }
    }

    /// Download a remote file, or a whole tree when `remote` ends in `/`.
    /// Returns the number of files that failed.
    pub async fn download(&self, remote: &str, local: &Path) -> Result<usize> {
        let remote = normalize_remote(remote);
        if remote.ends_with('/') {
            let mut visitor = PullVisitor {
                client: self.clone(),
                remote_root: remote.clone(),
                local_root: local.to_path_buf(),
                pool: WorkerPool::new(self.config.transfer_workers()),
                tasks: Vec::new(),
            };
            let pager = Paginator::new(self);
            // A listing failure aborts the walk, but already-spawned
            // downloads are drained, never abandoned.
            let walked = walk_remote(&pager, &remote, &mut visitor).await;
            let failed = drain_outcomes(visitor.tasks).await?;
            walked?;
            return Ok(failed);
        }
        let dest = resolve_local_dest(&remote, local);
        let outcome = self.pull_file(&remote, &dest).await;
        report(&outcome);
        Ok(usize::from(!outcome.success))
    }

    pub(crate) async fn pull_file(&self, remote: &str, dest: &Path) -> TransferOutcome {
        match self.download_file(remote, dest, 0).await {
            Ok(()) => TransferOutcome::ok(remote),
            Err(e) => TransferOutcome::fail(remote, e),
        }
    }

    /// Delete a remote file, or a directory tree when both `recursive` and
    /// `force` are set. Directory deletion without both flags is rejected
    /// before any network call. Returns the number of failed deletions.
    pub async fn delete(&self, path: &str, recursive: bool, force: bool) -> Result<usize> {
        let path = normalize_remote(path);
        if !path.ends_with('/') {
            let outcome = self.delete_outcome(&path).await;
            report(&outcome);
            return Ok(usize::from(!outcome.success));
        }
        if !recursive {
            return Err(Error::Refused(format!(
                "{path} is a directory; pass --recursive to remove it"
            )));
        }
        if !force {
            return Err(Error::Refused(format!(
                "refusing to remove directory {path} without --force"
            )));
        }

        let mut visitor = DeleteVisitor {
            client: self.clone(),
            root: path.clone(),
            failed: 0,
        };
        let pager = Paginator::new(self);
        walk_remote(&pager, &path, &mut visitor).await?;
        Ok(visitor.failed)
    }

    async fn delete_outcome(&self, path: &str) -> TransferOutcome {
        match self.delete_entry(path).await {
            Ok(()) => TransferOutcome::ok(path),
            Err(e) => TransferOutcome::fail(path, e),
        }
    }

    /// One `op=delete`, signed with a fresh single-use token.
    async fn delete_entry(&self, path: &str) -> Result<()> {
        let url = self.config.api_url(path);
        let auth = self.signer.once_signature(&self.config.file_id(path));
        let body = serde_json::json!({"op": "delete"});
        self.transport
            .post_json::<serde_json::Value>(&url, &auth, &body)
            .await?
            .ensure_ok()
    }

    /// Move (rename) a remote file.
    pub async fn move_object(&self, src: &str, dest: &str, overwrite: bool) -> Result<()> {
        let src = normalize_remote(src);
        let dest = normalize_remote(dest);
        let url = self.config.api_url(&src);
        let auth = self.signer.once_signature(&self.config.file_id(&src));
        let body = serde_json::json!({
            "op": "move",
            "dest_fileid": dest,
            "to_over_write": if overwrite { 1 } else { 0 },
        });
        self.transport
            .post_json::<serde_json::Value>(&url, &auth, &body)
            .await?
            .ensure_ok()
    }

    /// Stream a remote file to `out`.
    pub async fn cat<W: AsyncWrite + Unpin>(&self, remote: &str, out: &mut W) -> Result<()> {
        self.download_to_writer(&normalize_remote(remote), out).await
    }
}

async fn drain_outcomes(tasks: Vec<JoinHandle<bool>>) -> Result<usize> {
    let mut failed = 0;
    for task in tasks {
        match task.await {
            Ok(true) => {}
            Ok(false) => failed += 1,
            Err(e) => {
                error!("transfer worker aborted: {e}");
                failed += 1;
            }
        }
    }
    Ok(failed)
}

/// Where a single-file pull lands: into `local` when it names a file, or
/// under it (keeping the remote file name) when it is a directory.
fn resolve_local_dest(remote: &str, local: &Path) -> PathBuf {
    let name = remote.rsplit('/').next().unwrap_or(remote);
    let text = local.as_os_str().to_string_lossy();
    if text.is_empty() || local.is_dir() || text.ends_with(std::path::MAIN_SEPARATOR) {
        local.join(name)
    } else {
        local.to_path_buf()
    }
}

/// Pull visitor: creates local directories on entry, schedules one bounded
/// download task per file. Outcomes are printed as tasks finish.
struct PullVisitor {
    client: CosClient,
    remote_root: String,
    local_root: PathBuf,
    pool: WorkerPool,
    tasks: Vec<JoinHandle<bool>>,
}

impl PullVisitor {
    fn local_for(&self, remote: &str) -> PathBuf {
        let rel = remote.strip_prefix(&self.remote_root).unwrap_or(remote);
        let mut dest = self.local_root.clone();
        for part in rel.split('/').filter(|p| !p.is_empty()) {
            dest.push(part);
        }
        dest
    }
}

impl TreeVisitor for PullVisitor {
    async fn enter_dir(&mut self, path: &str) -> Result<()> {
        let dest = self.local_for(path);
        tokio::fs::create_dir_all(&dest)
            .await
            .map_err(|e| Error::io(dest, e))
    }

    async fn visit_file(&mut self, path: &str) -> Result<()> {
        let permit = self.pool.acquire().await;
        let client = self.client.clone();
        let remote = path.to_string();
        let dest = self.local_for(path);
        self.tasks.push(tokio::spawn(async move {
            let _permit = permit;
            let outcome = client.pull_file(&remote, &dest).await;
            report(&outcome);
            outcome.success
        }));
        Ok(())
    }

    async fn leave_dir(&mut self, _path: &str) -> Result<()> {
        Ok(())
    }
}

/// Delete visitor: removes files in listing order and each directory marker
/// after its contents. Per-entry failures are reported and counted, never
/// fatal; sequential execution keeps contents-before-marker ordering.
struct DeleteVisitor {
    client: CosClient,
    root: String,
    failed: usize,
}

impl DeleteVisitor {
    async fn remove(&mut self, path: &str) {
        let outcome = self.client.delete_outcome(path).await;
        report(&outcome);
        if !outcome.success {
            self.failed += 1;
        }
    }
}

impl TreeVisitor for DeleteVisitor {
    async fn enter_dir(&mut self, _path: &str) -> Result<()> {
        Ok(())
    }

    async fn visit_file(&mut self, path: &str) -> Result<()> {
        self.remove(path).await;
        Ok(())
    }

    async fn leave_dir(&mut self, path: &str) -> Result<()> {
        // The walk root itself is kept; only the tree under it goes.
        if path != self.root {
            self.remove(path).await;
        }
        Ok(())
    }
}
