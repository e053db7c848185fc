use std::collections::HashMap;

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const FOLDERS_PATH: &str = "/api/v1/folders";
const DOCUMENTS_PATH: &str = "/api/v1/documents";
const USERS_PATH: &str = "/api/v1/users";

#[derive(Debug, Error)]
pub enum DocStoreError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Clone)]
pub struct DocStoreClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl DocStoreClient {
    pub fn for_region(region: &str, token: impl Into<String>) -> Result<Self, DocStoreError> {
        Self::with_base_url(&format!("https://workdocs.{region}.amazonaws.com"), token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DocStoreError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn describe_folder_contents(
        &self,
        folder_id: &str,
        marker: Option<&str>,
    ) -> Result<FolderContents, DocStoreError> {
        let mut url = self.resource_endpoint(FOLDERS_PATH, &[folder_id, "contents"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("type", "FOLDER");
            if let Some(marker) = marker {
                query.append_pair("marker", marker);
            }
        }
        let response = self
            .http
            .get(url)
            .header("Authentication", &self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn list_child_folders(
        &self,
        folder_id: &str,
    ) -> Result<Vec<FolderMetadata>, DocStoreError> {
        let mut folders = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let page = self
                .describe_folder_contents(folder_id, marker.as_deref())
                .await?;
            folders.extend(page.folders);
            match page.marker.filter(|m| !m.is_empty()) {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        Ok(folders)
    }

    /// Every folder below `root_id`, parents listed before their children.
    pub async fn list_folders_recursive(
        &self,
        root_id: &str,
    ) -> Result<Vec<FolderMetadata>, DocStoreError> {
        let mut folders = Vec::new();
        let mut pending = vec![root_id.to_string()];
        while let Some(folder_id) = pending.pop() {
            let children = self.list_child_folders(&folder_id).await?;
            pending.extend(children.iter().rev().map(|child| child.id.clone()));
            folders.extend(children);
        }
        Ok(folders)
    }

    pub async fn create_folder(
        &self,
        parent_folder_id: &str,
        name: &str,
    ) -> Result<FolderMetadata, DocStoreError> {
        let url = self.endpoint(FOLDERS_PATH)?;
        let body = CreateFolderRequest {
            name,
            parent_folder_id,
        };
        let response = self
            .http
            .post(url)
            .header("Authentication", &self.token)
            .json(&body)
            .send()
            .await?;
        let created: CreateFolderResponse = Self::handle_response(response).await?;
        Ok(created.metadata)
    }

    pub async fn initiate_upload(
        &self,
        request: &UploadRequest,
    ) -> Result<UploadSession, DocStoreError> {
        let url = self.endpoint(DOCUMENTS_PATH)?;
        let response = self
            .http
            .post(url)
            .header("Authentication", &self.token)
            .json(request)
            .send()
            .await?;
        let payload: InitiateUploadResponse = Self::handle_response(response).await?;
        Ok(UploadSession {
            document_id: payload.metadata.id,
            version_id: payload.metadata.latest_version_metadata.id,
            upload_url: payload.upload_metadata.upload_url,
            signed_headers: payload.upload_metadata.signed_headers,
        })
    }

    pub async fn activate_version(
        &self,
        document_id: &str,
        version_id: &str,
    ) -> Result<(), DocStoreError> {
        let url =
            self.resource_endpoint(DOCUMENTS_PATH, &[document_id, "versions", version_id])?;
        let response = self
            .http
            .patch(url)
            .header("Authentication", &self.token)
            .json(&UpdateVersionRequest {
                version_status: "ACTIVE",
            })
            .send()
            .await?;
        Self::ensure_success(response).await.map(|_| ())
    }

    pub async fn describe_users(
        &self,
        organization_id: &str,
        query: &str,
    ) -> Result<Vec<User>, DocStoreError> {
        let mut users = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut url = self.endpoint(USERS_PATH)?;
            {
                let mut pairs = url.query_pairs_mut();
                pairs
                    .append_pair("organizationId", organization_id)
                    .append_pair("query", query);
                if let Some(marker) = marker.as_deref() {
                    pairs.append_pair("marker", marker);
                }
            }
            let response = self
                .http
                .get(url)
                .header("Authentication", &self.token)
                .send()
                .await?;
            let page: UsersPage = Self::handle_response(response).await?;
            users.extend(page.users);
            match page.marker.filter(|m| !m.is_empty()) {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        Ok(users)
    }

    fn endpoint(&self, path: &str) -> Result<Url, DocStoreError> {
        Ok(self.base_url.join(path)?)
    }

    fn resource_endpoint(&self, path: &str, segments: &[&str]) -> Result<Url, DocStoreError> {
        let mut url = self.endpoint(path)?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .extend(segments);
        Ok(url)
    }

    async fn ensure_success(response: Response) -> Result<Response, DocStoreError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DocStoreError::Api { status, body })
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: Response,
    ) -> Result<T, DocStoreError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct FolderMetadata {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FolderContents {
    #[serde(default)]
    pub folders: Vec<FolderMetadata>,
    #[serde(default)]
    pub marker: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub root_folder_id: Option<String>,
}

/// Timestamps are unix seconds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadRequest {
    pub parent_folder_id: String,
    pub name: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_created_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_modified_timestamp: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct UploadSession {
    pub document_id: String,
    pub version_id: String,
    pub upload_url: Url,
    pub signed_headers: HashMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateFolderRequest<'a> {
    name: &'a str,
    parent_folder_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateFolderResponse {
    metadata: FolderMetadata,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpdateVersionRequest {
    version_status: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateUploadResponse {
    metadata: DocumentMetadata,
    upload_metadata: UploadMetadata,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DocumentMetadata {
    id: String,
    latest_version_metadata: VersionMetadata,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VersionMetadata {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UploadMetadata {
    upload_url: Url,
    #[serde(default)]
    signed_headers: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UsersPage {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    marker: Option<String>,
}
