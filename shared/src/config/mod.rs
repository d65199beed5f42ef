pub mod config;

pub use self::config::{is_valid_proxy_entry, load_config, parse_config, parse_proxy_entry};
