//! External collaborators for FPN: the listing feed and the messaging channel.

pub mod feed;
pub mod messenger;

pub use feed::{
    parse_feed, FeedBatch, FeedClient, FeedError, FeedQuery, FeedSource, MalformedCandidate,
};
pub use messenger::{Messenger, SendError, TelegramMessenger};

pub const CRATE_NAME: &str = "fpn-adapters";
