use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const FILES_PATH: &str = "/drive/v3/files";

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

const FOLDER_QUERY: &str = "mimeType = 'application/vnd.google-apps.folder' and trashed = false";
const FILE_QUERY: &str = "trashed = false";
const FOLDER_FIELDS: &str = "nextPageToken, files(id, name, parents)";
const FILE_FIELDS: &str =
    "nextPageToken, files(id, name, parents, kind, mimeType, modifiedTime, md5Checksum, size)";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

impl DriveError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DriveError::Api { status, .. } => Some(*status),
            DriveError::Request(err) => err.status(),
            DriveError::Url(_) => None,
        }
    }

    /// Drive answers 416 for zero-length or already consumed media.
    pub fn is_range_not_satisfiable(&self) -> bool {
        self.status() == Some(StatusCode::RANGE_NOT_SATISFIABLE)
    }
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn get_root_folder(&self) -> Result<DriveFile, DriveError> {
        let mut url = self.file_endpoint("root", None)?;
        url.query_pairs_mut().append_pair("fields", "id, name");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn list_files(
        &self,
        query: &str,
        fields: &str,
        order_by: Option<&str>,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FileList, DriveError> {
        let mut url = self.endpoint(FILES_PATH)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", query)
                .append_pair("fields", fields)
                .append_pair("pageSize", &page_size.max(1).to_string());
            if let Some(order_by) = order_by {
                pairs.append_pair("orderBy", order_by);
            }
            if let Some(token) = page_token {
                pairs.append_pair("pageToken", token);
            }
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn list_folders_all(&self, page_size: u32) -> Result<Vec<DriveFile>, DriveError> {
        self.list_all(FOLDER_QUERY, FOLDER_FIELDS, None, page_size)
            .await
    }

    pub async fn list_files_all(&self, page_size: u32) -> Result<Vec<DriveFile>, DriveError> {
        self.list_all(FILE_QUERY, FILE_FIELDS, Some("quotaBytesUsed"), page_size)
            .await
    }

    async fn list_all(
        &self,
        query: &str,
        fields: &str,
        order_by: Option<&str>,
        page_size: u32,
    ) -> Result<Vec<DriveFile>, DriveError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .list_files(query, fields, order_by, page_size, page_token.as_deref())
                .await?;
            items.extend(page.files);
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(items)
    }

    /// Opens the raw bytes of a binary file.
    pub async fn open_media(&self, file_id: &str) -> Result<Response, DriveError> {
        let mut url = self.file_endpoint(file_id, None)?;
        url.query_pairs_mut().append_pair("alt", "media");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::ensure_success(response).await
    }

    /// Opens a native document rendered as `content_type`.
    pub async fn open_export(
        &self,
        file_id: &str,
        content_type: &str,
    ) -> Result<Response, DriveError> {
        let mut url = self.file_endpoint(file_id, Some("export"))?;
        url.query_pairs_mut().append_pair("mimeType", content_type);
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::ensure_success(response).await
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<(), DriveError> {
        let url = self.file_endpoint(file_id, None)?;
        let response = self
            .http
            .delete(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::ensure_success(response).await.map(|_| ())
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriveError> {
        Ok(self.base_url.join(path)?)
    }

    fn file_endpoint(&self, file_id: &str, tail: Option<&str>) -> Result<Url, DriveError> {
        let mut url = self.endpoint(FILES_PATH)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            segments.push(file_id);
            if let Some(tail) = tail {
                segments.push(tail);
            }
        }
        Ok(url)
    }

    async fn ensure_success(response: Response) -> Result<Response, DriveError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: Response,
    ) -> Result<T, DriveError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub modified_time: Option<String>,
    #[serde(default)]
    pub md5_checksum: Option<String>,
    /// Drive encodes int64 values as JSON strings.
    #[serde(default)]
    pub size: Option<String>,
}

impl DriveFile {
    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|v| v.parse().ok())
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}
