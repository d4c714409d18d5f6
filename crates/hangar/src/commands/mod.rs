mod config;
mod inject;
mod merge;
mod shim;
mod status;

pub use config::show_config;
pub use inject::{inject_modules, InjectArgs};
pub use merge::{merge_documents, MergeArgs};
pub use shim::{shim_module, ShimArgs};
pub use status::show_status;
