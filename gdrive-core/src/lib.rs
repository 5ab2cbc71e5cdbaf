mod client;
mod query;

pub use client::{ApiErrorClass, DriveClient, DriveError, DriveFile, FOLDER_MIME_TYPE, FileList};
pub use query::{children_query, escape_query_value};
pub use reqwest::StatusCode;
