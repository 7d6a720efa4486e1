//! HTTP clients for the platform's external collaborators: the push
//! gateway and the link-preview fetcher. Both are timeout-bounded so a
//! slow upstream cannot pin a request thread.

pub mod error;
pub mod preview;
pub mod push;

pub use error::{PreviewError, PreviewResult};
pub use preview::PreviewFetcher;
pub use push::HttpPushGateway;
