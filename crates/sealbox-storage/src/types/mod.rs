//! Type definitions for sealbox storage.

mod clients;
mod contents;
mod groups;
mod ids;
mod series;

pub use clients::*;
pub use contents::*;
pub use groups::*;
pub use ids::*;
pub use series::*;
