pub mod color;
pub mod loader;
pub mod types;

pub use color::TagColours;
pub use loader::ConfigLoader;
pub use types::{AlertsConfig, Cfg, HostConfig};
