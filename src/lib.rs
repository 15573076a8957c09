pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extractor;
pub mod handlers;
pub mod js_templates;
pub mod ledger;
pub mod model;
pub mod obstacle;
pub mod orchestrator;
pub mod output;
pub mod pagination;
pub mod policy;
pub mod profile;
pub mod renderer;
pub mod timeouts;
pub mod utils;

pub use config::{Config, RunConfig, UrlPolicy};
pub use error::HarvestError;
pub use orchestrator::{Harvest, Harvester};

pub type Result<T> = std::result::Result<T, HarvestError>;
