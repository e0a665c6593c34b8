pub mod entry;
pub mod feed;
pub mod raw;

pub use entry::Entry;
pub use feed::{Feed, FeedUpdate};
pub use raw::{RawEntry, RawFeedDocument, RawFeedMeta};
