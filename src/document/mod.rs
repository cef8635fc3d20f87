//! Document helpers
//!
//! Records exchanged with the host agent are JSON objects whose keys may use
//! the arrow convention (`address->city`) to reach nested properties.

mod flatten;
mod path;

pub use flatten::{flatten_record, unflatten_record};
pub use path::{
    get_path, get_record_path, project_record, remove_record_path, set_record_path, split_path,
    top_level,
};

/// A generic record exchanged with the host agent
pub type Record = serde_json::Map<String, serde_json::Value>;
