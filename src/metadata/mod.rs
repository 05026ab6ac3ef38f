pub mod cache;
pub mod fetch;
pub mod html;
pub mod url;

pub use cache::{Metadata, MetadataCache};
pub use fetch::{FetchedPage, HttpPageFetcher, PageFetcher};
pub use url::sanitize_url;
