pub mod base64;
pub mod file;
pub mod http;
pub mod matcher;
pub mod string;
pub mod url;

pub use file::{file_exists, file_get};
pub use http::{CancelFlag, FetchError, FetchOptions, FetchResponse, Fetcher, HttpFetcher};
