//! Composition root: settings in, wired services out.

pub mod context;
pub mod workflows;

pub use context::{AppBus, AppContext, AppDocuments, AppInventory, init_logging};
pub use workflows::{codes, seed_default_workflows};
