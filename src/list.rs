//! Cursor-based directory listing.

use crate::client::CosClient;
use crate::error::Result;
use crate::transport::ListData;
use crate::types::{ListingPage, LIST_PAGE_SIZE};

/// Wraps the `op=list` request into a restartable page sequence.
///
/// Callers loop: fetch with an empty cursor first, then keep passing the
/// previous page's cursor back until `is_last`. Pages for one directory are
/// always fetched sequentially, because each cursor depends on the previous
/// response.
pub struct Paginator<'a> {
    client: &'a CosClient,
}

impl<'a> Paginator<'a> {
    pub fn new(client: &'a CosClient) -> Paginator<'a> {
        Paginator { client }
    }

    /// Fetch one page of `dir`. An empty `cursor` requests the first page.
    pub async fn fetch_page(&self, dir: &str, cursor: &str) -> Result<ListingPage> {
        let dir = ensure_dir(dir);
        let url = format!(
            "{}?op=list&num={}&context={}",
            self.client.config.api_url(&dir),
            LIST_PAGE_SIZE,
            urlencoding::encode(cursor)
        );
        let auth = self.client.signer.multi_signature();
        let response = self
            .client
            .transport
            .get_json::<ListData>(&url, &auth)
            .await?;
        let data = response.into_data()?;

        let is_last = data.listover || data.context.is_empty();
        Ok(ListingPage {
            entries: data.infos,
            cursor: if is_last { String::new() } else { data.context },
            is_last,
        })
    }
}

/// Listing targets are directories; the service addresses them with a
/// trailing separator.
fn ensure_dir(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::test_client;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page_body(names: &[&str], context: &str, listover: bool) -> serde_json::Value {
        serde_json::json!({
            "code": 0,
            "message": "",
            "data": {
                "infos": names.iter().map(|n| serde_json::json!({"name": n})).collect::<Vec<_>>(),
                "context": context,
                "listover": listover,
            }
        })
    }

    #[tokio::test]
    async fn walks_cursor_chain_in_order_and_terminates() {
        let server = MockServer::start().await;
        let list_path = "/files/v2/100/bkt/a/";

        Mock::given(method("GET"))
            .and(path(list_path))
            .and(query_param("context", ""))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_body(&["one"], "c1", false)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(list_path))
            .and(query_param("context", "c1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_body(&["two"], "c2", false)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(list_path))
            .and(query_param("context", "c2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&["three"], "", true)))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let pager = Paginator::new(&client);

        let mut names = Vec::new();
        let mut cursor = String::new();
        let mut fetches = 0;
        loop {
            let page = pager.fetch_page("/a/", &cursor).await.unwrap();
            fetches += 1;
            names.extend(page.entries.into_iter().map(|e| e.name));
            if page.is_last {
                break;
            }
            cursor = page.cursor;
        }

        assert_eq!(fetches, 3);
        assert_eq!(names, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn last_page_always_has_empty_cursor() {
        let server = MockServer::start().await;
        // A service answering listover=true while still echoing a context.
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_body(&["x"], "stale", true)),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let page = Paginator::new(&client)
            .fetch_page("/a/", "")
            .await
            .unwrap();
        assert!(page.is_last);
        assert!(page.cursor.is_empty());
    }

    #[tokio::test]
    async fn remote_error_code_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": -166, "message": "directory not exists"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = Paginator::new(&client)
            .fetch_page("/missing/", "")
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Remote { code: -166, .. }));
    }
}
