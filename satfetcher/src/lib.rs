pub mod celestrak;
pub mod error;
pub mod http;
pub mod links;
pub mod ucs;

pub use crate::celestrak::CelestrakFetcher;
pub use crate::error::FetchError;
pub use crate::http::HttpSource;
pub use crate::links::{LinkChecker, LinkEntry, LinkStatus};
pub use crate::ucs::UcsFetcher;
