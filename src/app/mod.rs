mod catalog;
mod event_handler;
mod pipeline;
mod state;
mod templates;

pub use catalog::shared as shared_catalog;
pub use event_handler::run;
pub use pipeline::{Orchestrator, Settings};
pub use state::UserAction;
