pub mod author;
pub mod listing;
pub mod normalize;

pub use author::parse_author_page;
pub use listing::{parse_listing, ListingPage};
