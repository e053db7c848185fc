use drive2docs_core::{DocStoreClient, UploadRequest};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn describe_folder_contents_sends_authentication_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/folders/root-1/contents"))
        .and(query_param("type", "FOLDER"))
        .and(header("authentication", "wd-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Folders": [
                { "Id": "d1", "Name": "Reports", "ParentFolderId": "root-1" }
            ],
            "Documents": []
        })))
        .mount(&server)
        .await;

    let client = DocStoreClient::with_base_url(&server.uri(), "wd-token").unwrap();
    let contents = client.describe_folder_contents("root-1", None).await.unwrap();

    assert_eq!(contents.folders.len(), 1);
    assert_eq!(contents.folders[0].name, "Reports");
    assert_eq!(
        contents.folders[0].parent_folder_id.as_deref(),
        Some("root-1")
    );
    assert!(contents.marker.is_none());
}

#[tokio::test]
async fn list_folders_recursive_walks_pages_and_children() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/folders/root-1/contents"))
        .and(query_param_is_missing("marker"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Folders": [ { "Id": "d1", "Name": "Reports", "ParentFolderId": "root-1" } ],
            "Marker": "next"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/folders/root-1/contents"))
        .and(query_param("marker", "next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Folders": [ { "Id": "d2", "Name": "Archive", "ParentFolderId": "root-1" } ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/folders/d1/contents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Folders": [ { "Id": "d3", "Name": "2024", "ParentFolderId": "d1" } ]
        })))
        .mount(&server)
        .await;
    for leaf in ["d2", "d3"] {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/folders/{leaf}/contents")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Folders": [] })))
            .mount(&server)
            .await;
    }

    let client = DocStoreClient::with_base_url(&server.uri(), "wd-token").unwrap();
    let folders = client.list_folders_recursive("root-1").await.unwrap();

    let mut ids: Vec<_> = folders.iter().map(|f| f.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["d1", "d2", "d3"]);
}

#[tokio::test]
async fn create_folder_posts_name_and_parent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/folders"))
        .and(body_json(json!({ "Name": "Reports", "ParentFolderId": "root-1" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "Metadata": { "Id": "new-1", "Name": "Reports", "ParentFolderId": "root-1" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = DocStoreClient::with_base_url(&server.uri(), "wd-token").unwrap();
    let folder = client.create_folder("root-1", "Reports").await.unwrap();

    assert_eq!(folder.id, "new-1");
}

#[tokio::test]
async fn initiate_upload_returns_session() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/documents"))
        .and(body_json(json!({
            "ParentFolderId": "d1",
            "Name": "Q1.pdf",
            "ContentType": "application/pdf",
            "ContentCreatedTimestamp": 1709287200,
            "ContentModifiedTimestamp": 1709287200
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "Metadata": {
                "Id": "doc-1",
                "LatestVersionMetadata": { "Id": "ver-1" }
            },
            "UploadMetadata": {
                "UploadUrl": "https://upload.example/doc-1",
                "SignedHeaders": { "Content-Type": "application/pdf" }
            }
        })))
        .mount(&server)
        .await;

    let client = DocStoreClient::with_base_url(&server.uri(), "wd-token").unwrap();
    let session = client
        .initiate_upload(&UploadRequest {
            parent_folder_id: "d1".into(),
            name: "Q1.pdf".into(),
            content_type: "application/pdf".into(),
            content_created_timestamp: Some(1709287200),
            content_modified_timestamp: Some(1709287200),
        })
        .await
        .unwrap();

    assert_eq!(session.document_id, "doc-1");
    assert_eq!(session.version_id, "ver-1");
    assert_eq!(session.upload_url.as_str(), "https://upload.example/doc-1");
    assert_eq!(
        session.signed_headers.get("Content-Type").map(String::as_str),
        Some("application/pdf")
    );
}

#[tokio::test]
async fn activate_version_patches_status() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/api/v1/documents/doc-1/versions/ver-1"))
        .and(body_json(json!({ "VersionStatus": "ACTIVE" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = DocStoreClient::with_base_url(&server.uri(), "wd-token").unwrap();
    client.activate_version("doc-1", "ver-1").await.unwrap();
}

#[tokio::test]
async fn describe_users_filters_by_organization() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users"))
        .and(query_param("organizationId", "d-123"))
        .and(query_param("query", "jane"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Users": [
                {
                    "Id": "u1",
                    "Username": "jane",
                    "EmailAddress": "jane@example.com",
                    "RootFolderId": "root-jane"
                }
            ]
        })))
        .mount(&server)
        .await;

    let client = DocStoreClient::with_base_url(&server.uri(), "wd-token").unwrap();
    let users = client.describe_users("d-123", "jane").await.unwrap();

    assert_eq!(users.len(), 1);
    assert_eq!(users[0].root_folder_id.as_deref(), Some("root-jane"));
}

#[tokio::test]
async fn api_errors_surface_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/folders"))
        .respond_with(ResponseTemplate::new(409).set_body_string("EntityAlreadyExists"))
        .mount(&server)
        .await;

    let client = DocStoreClient::with_base_url(&server.uri(), "wd-token").unwrap();
    let err = client
        .create_folder("root-1", "Reports")
        .await
        .expect_err("expected conflict");

    assert!(err.to_string().contains("EntityAlreadyExists"));
}
