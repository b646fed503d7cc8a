pub mod error;
pub use error::Result;
pub use error::Error;

pub mod config;
pub use config::Config;
pub use config::RepositoryConfig;

pub mod metadb;
pub use metadb::MetaDB;
pub use metadb::ItemHooks;
pub use metadb::item::Item;
pub use metadb::item_set::ItemSet;
pub use metadb::progress::ProgressToken;
pub use metadb::progress::ProgressState;

pub mod repository;
pub use repository::Repository;

pub mod installation;
pub use installation::DownloadManager;
