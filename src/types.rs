//! Core transfer types and fixed protocol constants.

use serde::Deserialize;

/// Files at most this large are sent as one multipart upload request;
/// anything bigger goes through the slice upload session.
pub const MAX_SINGLE_SIZE: u64 = 8 * 1024 * 1024;

/// Byte length of one upload slice.
pub const SLICE_SIZE: u64 = 3 * 1024 * 1024;

/// Maximum entries returned per listing request.
pub const LIST_PAGE_SIZE: u32 = 199;

/// Default cap on concurrent whole-file transfers.
pub const DEFAULT_TRANSFER_WORKERS: usize = 20;

/// Default cap on concurrent slice uploads within one large file.
pub const DEFAULT_SLICE_WORKERS: usize = 10;

/// Consecutive no-progress attempts a download tolerates before giving up.
pub const DOWNLOAD_RETRIES: u32 = 3;

/// One object or directory marker returned by a listing.
///
/// Directory entries carry a trailing `/` in `name`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
}

impl RemoteEntry {
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// One page of a directory listing.
///
/// `is_last == true` iff `cursor` is empty; a non-final page's cursor is
/// passed back verbatim to fetch the next page. Pages concatenated in fetch
/// order form the complete, order-preserving entry set.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub entries: Vec<RemoteEntry>,
    pub cursor: String,
    pub is_last: bool,
}

/// Server-issued state for one large-file upload. Lives only for the
/// duration of that upload call, never persisted.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub url: String,
    pub session: String,
    pub total_size: u64,
    pub slice_size: u64,
}

/// One contiguous byte range of a large file, uploaded as an independent
/// request within a shared session. The tasks for one session partition
/// `[0, total_size)` with no gaps or overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceTask {
    pub offset: u64,
    pub length: u64,
}

/// Terminal result of one file's transfer. Never retried once produced.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub target: String,
    pub success: bool,
    pub message: String,
}

impl TransferOutcome {
    pub fn ok(target: impl Into<String>) -> Self {
        TransferOutcome {
            target: target.into(),
            success: true,
            message: String::new(),
        }
    }

    pub fn fail(target: impl Into<String>, message: impl ToString) -> Self {
        TransferOutcome {
            target: target.into(),
            success: false,
            message: message.to_string(),
        }
    }
}

/// Print one outcome line. Failure lines are prefixed distinctly so they
/// stay greppable in bulk transfers.
pub(crate) fn report(outcome: &TransferOutcome) {
    if outcome.success {
        println!("[ok  ] {}", outcome.target);
    } else {
        println!("[fail] {}: {}", outcome.target, outcome.message);
    }
}
