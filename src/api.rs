// API client module: the `StorageApi` trait names the five remote calls
// the purge pipeline needs, and `ApiClient` implements them against the
// Dropbox HTTP API with a small blocking reqwest client.
//
// Everything above this module talks to `StorageApi` only, so tests can
// swap in a scripted fake.

use crate::error::ApiError;
use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

const DEFAULT_API_URL: &str = "https://api.dropboxapi.com";
const DEFAULT_CONTENT_URL: &str = "https://content.dropboxapi.com";

/// The remote operations the enumerator, previewer and deleter rely on.
pub trait StorageApi {
    fn list_folder(
        &self,
        path: &str,
        limit: u32,
        include_deleted: bool,
    ) -> Result<ListFolderPage, ApiError>;

    fn list_folder_continue(&self, cursor: &str) -> Result<ListFolderPage, ApiError>;

    /// One result per requested entry, in request order. A failed entry
    /// does not fail the batch.
    fn get_thumbnail_batch(
        &self,
        entries: &[ThumbnailRequest],
    ) -> Result<Vec<ThumbnailResult>, ApiError>;

    fn delete_batch(&self, paths: &[String]) -> Result<DeleteLaunch, ApiError>;

    fn delete_batch_check(&self, job_id: &str) -> Result<JobStatus, ApiError>;
}

/// Kind of a listing entry, from the `.tag` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryTag {
    File,
    Folder,
    Deleted,
}

/// One entry of a folder listing page. Deleted entries carry no id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Entry {
    #[serde(rename = ".tag")]
    pub tag: EntryTag,
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path_lower: String,
    #[serde(default)]
    pub path_display: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListFolderPage {
    pub entries: Vec<Entry>,
    pub cursor: String,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = ".tag")]
pub enum ThumbnailSize {
    #[serde(rename = "w32h32")]
    W32H32,
    #[serde(rename = "w64h64")]
    W64H64,
    #[serde(rename = "w128h128")]
    W128H128,
    #[serde(rename = "w256h256")]
    W256H256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailRequest {
    pub path: String,
    pub size: ThumbnailSize,
}

/// Settled outcome for a single thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailResult {
    Success { name: String, bytes: Vec<u8> },
    Failure { reason: String },
}

/// Response to a batch delete submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteLaunch {
    Complete,
    AsyncJob(String),
}

/// Status of an asynchronous delete job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    InProgress,
    Complete,
    Failed(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::InProgress)
    }
}

// Request bodies ----------------------------------------------------------

#[derive(Serialize, Debug)]
struct ListFolderArg<'a> {
    path: &'a str,
    limit: u32,
    include_deleted: bool,
    recursive: bool,
}

#[derive(Serialize, Debug)]
struct CursorArg<'a> {
    cursor: &'a str,
}

#[derive(Serialize, Debug)]
struct PathArg<'a> {
    path: &'a str,
}

#[derive(Serialize, Debug)]
struct DeleteBatchArg<'a> {
    entries: Vec<PathArg<'a>>,
}

#[derive(Serialize, Debug)]
struct AsyncJobArg<'a> {
    async_job_id: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(tag = ".tag", rename_all = "snake_case")]
enum ThumbnailFormat {
    Jpeg,
}

#[derive(Serialize, Debug)]
struct ThumbnailArg<'a> {
    path: &'a str,
    format: ThumbnailFormat,
    size: ThumbnailSize,
}

#[derive(Serialize, Debug)]
struct ThumbnailBatchArg<'a> {
    entries: Vec<ThumbnailArg<'a>>,
}

// Response bodies ---------------------------------------------------------

/// Error envelope Dropbox sends with 4xx responses.
#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error_summary: String,
}

#[derive(Deserialize, Debug)]
#[serde(tag = ".tag", rename_all = "snake_case")]
enum DeleteBatchLaunchBody {
    AsyncJobId { async_job_id: String },
    Complete,
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
#[serde(tag = ".tag", rename_all = "snake_case")]
enum DeleteBatchStatusBody {
    InProgress,
    Complete,
    Failed {
        #[serde(default)]
        failed: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct ThumbnailMetadata {
    name: String,
}

#[derive(Deserialize, Debug)]
#[serde(tag = ".tag", rename_all = "snake_case")]
enum ThumbnailEntryBody {
    Success {
        metadata: ThumbnailMetadata,
        thumbnail: String,
    },
    Failure {
        #[serde(default)]
        failure: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct ThumbnailBatchBody {
    entries: Vec<ThumbnailEntryBody>,
}

/// Dropbox reports union errors as `{".tag": "reason", ...}`.
fn union_reason(value: &serde_json::Value) -> String {
    match value.get(".tag").and_then(|t| t.as_str()) {
        Some(tag) => tag.to_string(),
        None if value.is_null() => "unknown".to_string(),
        None => value.to_string(),
    }
}

impl DeleteBatchStatusBody {
    fn into_status(self) -> Result<JobStatus, ApiError> {
        match self {
            DeleteBatchStatusBody::InProgress => Ok(JobStatus::InProgress),
            DeleteBatchStatusBody::Complete => Ok(JobStatus::Complete),
            DeleteBatchStatusBody::Failed { failed } => Ok(JobStatus::Failed(union_reason(&failed))),
            DeleteBatchStatusBody::Other => Err(ApiError::Unexpected {
                endpoint: "files/delete_batch/check".into(),
                detail: "unknown job status".into(),
            }),
        }
    }
}

impl ThumbnailEntryBody {
    fn into_result(self) -> ThumbnailResult {
        match self {
            ThumbnailEntryBody::Success { metadata, thumbnail } => {
                match STANDARD.decode(thumbnail.as_bytes()) {
                    Ok(bytes) => ThumbnailResult::Success {
                        name: metadata.name,
                        bytes,
                    },
                    Err(e) => ThumbnailResult::Failure {
                        reason: format!("bad thumbnail encoding for {}: {}", metadata.name, e),
                    },
                }
            }
            ThumbnailEntryBody::Failure { failure } => ThumbnailResult::Failure {
                reason: union_reason(&failure),
            },
            ThumbnailEntryBody::Other => ThumbnailResult::Failure {
                reason: "unknown thumbnail result".into(),
            },
        }
    }
}

/// Blocking Dropbox client holding the base URLs and the access token.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    api_url: String,
    content_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create an ApiClient configured from `DROPBOX_API_URL` and
    /// `DROPBOX_CONTENT_URL`, falling back to the public Dropbox hosts.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_url = std::env::var("DROPBOX_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        let content_url =
            std::env::var("DROPBOX_CONTENT_URL").unwrap_or_else(|_| DEFAULT_CONTENT_URL.into());
        Self::new(&api_url, &content_url)
    }

    pub fn new(api_url: &str, content_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiClient {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            content_url: content_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Store the access token used on every request.
    pub fn set_token(&mut self, token: &str) {
        self.token = Some(token.trim().to_string());
    }

    pub fn has_token(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    fn auth_headers(&self) -> Result<HeaderMap, ApiError> {
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::InvalidToken)?;
        let mut headers = HeaderMap::new();
        let val = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ApiError::InvalidToken)?;
        headers.insert(AUTHORIZATION, val);
        Ok(headers)
    }

    /// POST a JSON body to an RPC-style endpoint and decode the JSON reply.
    fn rpc<B, R>(&self, base: &str, endpoint: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = format!("{}/2/{}", base, endpoint);
        trace!(%url, "POST");
        let res = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .json(body)
            .send()
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = res.status();
        let txt = res.text().map_err(|source| ApiError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;

        if !status.is_success() {
            let summary = serde_json::from_str::<ErrorEnvelope>(&txt)
                .map(|e| e.error_summary)
                .unwrap_or(txt);
            debug!(endpoint, status = status.as_u16(), %summary, "request rejected");
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                summary,
            });
        }

        serde_json::from_str(&txt).map_err(|source| ApiError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

impl StorageApi for ApiClient {
    fn list_folder(
        &self,
        path: &str,
        limit: u32,
        include_deleted: bool,
    ) -> Result<ListFolderPage, ApiError> {
        let arg = ListFolderArg {
            path,
            limit,
            include_deleted,
            recursive: false,
        };
        self.rpc(&self.api_url, "files/list_folder", &arg)
    }

    fn list_folder_continue(&self, cursor: &str) -> Result<ListFolderPage, ApiError> {
        self.rpc(&self.api_url, "files/list_folder/continue", &CursorArg { cursor })
    }

    fn get_thumbnail_batch(
        &self,
        entries: &[ThumbnailRequest],
    ) -> Result<Vec<ThumbnailResult>, ApiError> {
        let arg = ThumbnailBatchArg {
            entries: entries
                .iter()
                .map(|e| ThumbnailArg {
                    path: &e.path,
                    format: ThumbnailFormat::Jpeg,
                    size: e.size,
                })
                .collect(),
        };
        let body: ThumbnailBatchBody =
            self.rpc(&self.content_url, "files/get_thumbnail_batch", &arg)?;
        Ok(body.entries.into_iter().map(ThumbnailEntryBody::into_result).collect())
    }

    fn delete_batch(&self, paths: &[String]) -> Result<DeleteLaunch, ApiError> {
        let arg = DeleteBatchArg {
            entries: paths.iter().map(|p| PathArg { path: p }).collect(),
        };
        let body: DeleteBatchLaunchBody = self.rpc(&self.api_url, "files/delete_batch", &arg)?;
        match body {
            DeleteBatchLaunchBody::AsyncJobId { async_job_id } => Ok(DeleteLaunch::AsyncJob(async_job_id)),
            DeleteBatchLaunchBody::Complete => Ok(DeleteLaunch::Complete),
            DeleteBatchLaunchBody::Other => Err(ApiError::Unexpected {
                endpoint: "files/delete_batch".into(),
                detail: "neither a job id nor a completed result".into(),
            }),
        }
    }

    fn delete_batch_check(&self, job_id: &str) -> Result<JobStatus, ApiError> {
        let body: DeleteBatchStatusBody = self.rpc(
            &self.api_url,
            "files/delete_batch/check",
            &AsyncJobArg { async_job_id: job_id },
        )?;
        body.into_status()
    }
}
