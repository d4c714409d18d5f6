//! Structured merging of mod contributions into game resources.
//!
//! - [`json`]: lenient game JSON parsing and the replace-arrays deep merge
//! - [`JsonPath`] and [`Instruction`]: the edit language of advanced merges
//! - [`merge_into_target`] / [`merge_documents`]: plain or advanced merges
//! - [`append_text`]: text and CSV appends
//! - [`MergeCache`]: skips merges whose inputs did not change since the last run
//!
//! # Example
//!
//! ```
//! use hangar_merge::{Instruction, MergeAction};
//! use serde_json::json;
//!
//! let mut mech = json!({"weapons": [{"id": "ac20"}]});
//! let add = Instruction::new(MergeAction::ArrayAdd, "$.weapons", json!({"id": "laser1"}));
//! assert!(add.process(&mut mech).unwrap());
//! assert_eq!(mech, json!({"weapons": [{"id": "ac20"}, {"id": "laser1"}]}));
//! ```

mod advanced;
mod cache;
mod error;
mod instruction;
pub mod json;
mod path;
mod text;

pub use advanced::{is_advanced_merge, merge_documents, merge_into_target, AdvancedMerge, MergeFailure, MergeJob};
pub use cache::{
    cache_key, FileVersion, MergeCache, MergeCacheRecord, ModContribution, ADVANCED_JSON_MERGE_TYPE,
};
pub use error::{Error, Result};
pub use instruction::{Instruction, MergeAction};
pub use path::{CompareOp, JsonPath, Location, Segment, Selector, Step};
pub use text::{append_text, AppendMode};
