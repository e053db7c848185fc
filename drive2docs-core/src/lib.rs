mod docstore;
mod drive;

pub use docstore::{
    DocStoreClient, DocStoreError, FolderContents, FolderMetadata, UploadRequest, UploadSession,
    User,
};
pub use drive::{DriveClient, DriveError, DriveFile, FOLDER_MIME_TYPE, FileList};
