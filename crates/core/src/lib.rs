pub mod config;
pub mod download;
pub mod engine;
pub mod layout;
pub mod metrics;
pub mod queue;
pub mod store;
pub mod testing;
pub mod vendor;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DownloadConfig,
    EngineConfig, QueueConfig,
};
pub use download::{DownloadError, DownloadHandle, Downloader, HttpDownloader};
pub use engine::{TransformEngine, TransformError, TransformHandle, TransformProgress, TransformStep};
pub use layout::{FileLayoutTransformer, FileRecord, LayoutOutcome};
pub use queue::{QueueManager, QueueStatus, WorkClass, WorkProvider};
pub use store::{
    AliasDefinition, AliasLookup, LocalOrderRecord, OrderState, ProductType, Repository,
    RepositoryError,
};
pub use vendor::{OrderProvider, ProviderError, VendorOrder, VendorOrderItem, VendorStatus};
