//! Input/output helpers.
//!
//! - paradigm file ingest + validation (`paradigm`)
//! - NIfTI volume load/save + grid checks (`volume`)
//! - design JSON read/write (`design_json`)
//! - design/summary exports (CSV, MAT) (`export`, `mat`)
//! - perfusion operator CSV (`operator`)
//! - protocol TOML (`protocol`)

pub mod design_json;
pub mod export;
pub mod mat;
pub mod operator;
pub mod paradigm;
pub mod protocol;
pub mod volume;

pub use design_json::*;
pub use export::*;
pub use mat::*;
pub use operator::*;
pub use paradigm::*;
pub use protocol::*;
pub use volume::*;
