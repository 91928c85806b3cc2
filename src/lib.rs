pub mod appstate;
pub mod cli;
pub mod config;
pub mod error;
pub mod navigation;
pub mod query;
pub mod session;
pub mod snapshot;
pub mod status;
pub mod store;
pub mod surface;
pub mod variant;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use session::{BrowserSession, SearchOutcome};
pub use snapshot::FilterSnapshot;
pub use status::{ItemStatus, StatusPolicy};
