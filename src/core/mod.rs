pub mod key;
pub mod page;
pub mod value;

pub use key::{decode, encode, Namespace, MAX_SORT_CHAR};
pub use page::{page_identity, timestamp_suffix, PageCapture, PageRecord};
pub use value::{normalize, Normalized, TimestampValue};
