pub mod admin;
pub mod scrape_configs;
pub mod targets;

pub use admin::admin_index_handler;
pub use scrape_configs::scrape_configs_handler;
pub use targets::targets_handler;
