mod app_config;
mod catalog;
mod config;

pub use app_config::{AppConfig, Environment};
pub use catalog::{
    AttributeSelection, CatalogProduct, CatalogVariation, MetaEntry, ProductKind, SyncStatus,
};
pub use config::{load_app_config, load_app_config_from_env, ConfigError};
