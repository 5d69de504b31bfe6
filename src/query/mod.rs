pub mod search;
pub mod server;

pub use search::{SearchQuery, SearchResult};
pub use server::{QueryServer, SearchParams};
