//! Tree traversal: remote walks over listing pages, local walks for
//! directory pushes.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::list::Paginator;
use crate::types::RemoteEntry;

/// Hooks applied while walking a remote directory tree.
///
/// Files are visited in listing order; a directory entry is fully handled
/// (entered, its contents visited, left) before any later sibling is touched.
pub(crate) trait TreeVisitor {
    /// A directory was reached, before any of its entries.
    async fn enter_dir(&mut self, path: &str) -> Result<()>;
    /// A file entry, in listing order.
    async fn visit_file(&mut self, path: &str) -> Result<()>;
    /// All entries of a directory have been handled.
    async fn leave_dir(&mut self, path: &str) -> Result<()>;
}

struct Frame {
    path: String,
    pending: VecDeque<RemoteEntry>,
    cursor: String,
    exhausted: bool,
    entered: bool,
}

impl Frame {
    fn new(path: String) -> Frame {
        Frame {
            path,
            pending: VecDeque::new(),
            cursor: String::new(),
            exhausted: false,
            entered: false,
        }
    }
}

/// Depth-first traversal of the remote tree under `root` (a directory path
/// ending in `/`), driven by an explicit frame stack instead of recursion so
/// deep trees cannot overflow the call stack.
///
/// Listing pages within one directory are fetched strictly in cursor order;
/// a listing failure is fatal to the whole walk.
pub(crate) async fn walk_remote<V: TreeVisitor>(
    pager: &Paginator<'_>,
    root: &str,
    visitor: &mut V,
) -> Result<()> {
    let mut stack = vec![Frame::new(root.to_string())];

    while let Some(frame) = stack.last_mut() {
        if !frame.entered {
            frame.entered = true;
            let path = frame.path.clone();
            visitor.enter_dir(&path).await?;
            continue;
        }

        if let Some(entry) = frame.pending.pop_front() {
            let child = format!("{}{}", frame.path, entry.name);
            if entry.is_dir() {
                stack.push(Frame::new(child));
            } else {
                visitor.visit_file(&child).await?;
            }
            continue;
        }

        if !frame.exhausted {
            let page = pager.fetch_page(&frame.path, &frame.cursor).await?;
            frame.exhausted = page.is_last;
            frame.cursor = page.cursor;
            frame.pending = page.entries.into();
            continue;
        }

        let finished = stack.pop().expect("walk stack underflow");
        visitor.leave_dir(&finished.path).await?;
    }

    Ok(())
}

/// One file found under a local directory tree.
#[derive(Debug, Clone)]
pub(crate) struct LocalFile {
    pub path: PathBuf,
    /// Path relative to the walked root, with `/` separators.
    pub rel: String,
}

/// Stack-based scan of a local directory tree, returning every file sorted
/// by relative path for deterministic upload order.
pub(crate) async fn walk_local(root: &Path) -> Result<Vec<LocalFile>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(current) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .map_err(|e| Error::io(&current, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io(&current, e))?
        {
            let path = entry.path();
            let metadata = tokio::fs::metadata(&path)
                .await
                .map_err(|e| Error::io(&path, e))?;
            if metadata.is_dir() {
                stack.push(path);
            } else if metadata.is_file() {
                let rel = path
                    .strip_prefix(root)
                    .map_err(|_| {
                        Error::io(
                            &path,
                            std::io::Error::other("entry escaped the walked root"),
                        )
                    })?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push(LocalFile { path, rel });
            }
        }
    }

    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::test_client;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl TreeVisitor for Recorder {
        async fn enter_dir(&mut self, path: &str) -> Result<()> {
            self.events.push(format!("enter {path}"));
            Ok(())
        }
        async fn visit_file(&mut self, path: &str) -> Result<()> {
            self.events.push(format!("file {path}"));
            Ok(())
        }
        async fn leave_dir(&mut self, path: &str) -> Result<()> {
            self.events.push(format!("leave {path}"));
            Ok(())
        }
    }

    fn listing(names: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "code": 0,
            "message": "",
            "data": {
                "infos": names.iter().map(|n| serde_json::json!({"name": n})).collect::<Vec<_>>(),
                "context": "",
                "listover": true,
            }
        })
    }

    #[tokio::test]
    async fn depth_first_in_listing_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/v2/100/bkt/a/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(&["x", "b/", "z"])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/v2/100/bkt/a/b/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(&["y"])))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let pager = Paginator::new(&client);
        let mut recorder = Recorder::default();
        walk_remote(&pager, "/a/", &mut recorder).await.unwrap();

        assert_eq!(
            recorder.events,
            vec![
                "enter /a/",
                "file /a/x",
                "enter /a/b/",
                "file /a/b/y",
                "leave /a/b/",
                "file /a/z",
                "leave /a/",
            ]
        );
    }

    #[tokio::test]
    async fn listing_failure_aborts_the_walk() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": -166, "message": "directory not exists"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let pager = Paginator::new(&client);
        let mut recorder = Recorder::default();
        let err = walk_remote(&pager, "/gone/", &mut recorder)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));
        // The root was entered, but nothing was visited.
        assert_eq!(recorder.events, vec!["enter /gone/"]);
    }

    #[tokio::test]
    async fn walk_local_collects_files_sorted_by_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("sub/deeper/c.txt"), b"c").unwrap();

        let files = walk_local(dir.path()).await.unwrap();
        let rels: Vec<&str> = files.iter().map(|f| f.rel.as_str()).collect();
        assert_eq!(rels, vec!["a.txt", "b.txt", "sub/deeper/c.txt"]);
    }
}
