pub mod feed;
pub mod hub;

pub use hub::{ChangeFeed, FeedEvent, Subscription};
