// Public modules
pub mod config;
pub mod csv;
pub mod digest;
pub mod discovery;
pub mod feed;
pub mod fingerprint;
pub mod history;
pub mod models;
pub mod notify;
pub mod phrases;
pub mod pipeline;
pub mod retry;
pub mod schedule;
pub mod scorer;
pub mod sources;
pub mod status;
pub mod store;
pub mod translate;

// Re-export commonly used types
pub use config::{Config, RunSettings};
pub use digest::DigestGenerator;
pub use discovery::{DiscoveryMethod, FeedFinder};
pub use feed::{FeedClient, FeedError};
pub use fingerprint::fingerprint;
pub use history::PushHistory;
pub use models::{Article, FeedEntry, FeedSource};
pub use notify::{Notifier, StdoutNotifier, WebhookNotifier};
pub use pipeline::{PushRun, RunReport};
pub use retry::RetryPolicy;
pub use schedule::{DeliveryPlan, PushQueue};
pub use scorer::{Score, Scorer, ScoringConfig};
pub use status::FeedStatusBook;
pub use store::{JsonFileRepository, MemoryRepository, Repository};
pub use translate::Translator;
