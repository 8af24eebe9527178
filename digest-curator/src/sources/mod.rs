pub mod discovery;
pub mod feed;
pub mod forum;
pub mod hacker_news;

pub use discovery::{CuratedSeeds, DiscoverySource, DiscoveryStrategy, QueryFeeds};
pub use feed::{FeedSettings, FeedSource, LinkResolver, RelevanceMode};
pub use forum::{
    ApiListing, CommunityDiscovery, ForumScope, ForumSource, ForumStrategy, KeywordSearch,
    PublicListing, TierOutput,
};
pub use hacker_news::HackerNewsSource;
