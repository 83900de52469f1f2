//! HTTP plumbing: one shared client, envelope decoding.

use reqwest::header::{AUTHORIZATION, RANGE};
use reqwest::multipart::Form;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};

/// JSON envelope every API response is wrapped in. `code == 0` is success;
/// `data` carries the operation-specific payload.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Fail on a non-zero envelope code.
    pub fn ensure_ok(&self) -> Result<()> {
        if self.code == 0 {
            Ok(())
        } else {
            Err(Error::Remote {
                code: self.code,
                message: self.message.clone(),
            })
        }
    }

    /// Fail on a non-zero code or a missing payload.
    pub fn into_data(self) -> Result<T> {
        self.ensure_ok()?;
        self.data.ok_or(Error::Remote {
            code: -1,
            message: "response carried no data".into(),
        })
    }
}

/// Payload of a listing response.
#[derive(Debug, Deserialize)]
pub struct ListData {
    #[serde(default)]
    pub listover: bool,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub infos: Vec<crate::types::RemoteEntry>,
}

/// Payload of a slice-init response.
#[derive(Debug, Deserialize)]
pub struct SliceInitData {
    pub session: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Thin wrapper over one shared [`reqwest::Client`]. Connection failures and
/// undecodable bodies surface as [`Error::Transport`]; envelope codes are the
/// caller's business.
#[derive(Clone)]
pub struct Transport {
    client: Client,
}

impl Transport {
    pub fn new() -> Result<Transport> {
        let client = Client::builder().build()?;
        Ok(Transport { client })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        auth: &str,
    ) -> Result<ApiResponse<T>> {
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, auth)
            .send()
            .await?;
        Ok(response.json().await?)
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        auth: &str,
        body: &serde_json::Value,
    ) -> Result<ApiResponse<T>> {
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, auth)
            .json(body)
            .send()
            .await?;
        Ok(response.json().await?)
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        url: &str,
        auth: &str,
        form: Form,
    ) -> Result<ApiResponse<T>> {
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, auth)
            .multipart(form)
            .send()
            .await?;
        Ok(response.json().await?)
    }

    /// Start a raw object fetch, with a byte-range header when resuming.
    /// Returns the response for the caller to stream; non-2xx statuses are
    /// already turned into errors here.
    pub async fn get_stream(&self, url: &str, auth: &str, offset: u64) -> Result<Response> {
        let mut request = self.client.get(url).header(AUTHORIZATION, auth);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        let response = request.send().await?;
        Ok(response.error_for_status()?)
    }
}
