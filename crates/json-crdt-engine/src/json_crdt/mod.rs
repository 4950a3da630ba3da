//! The replicated JSON document.
//!
//! - [`nodes`]: the seven node types and the RGA sequence they build on.
//! - [`model`]: the [`Model`], which applies patches and renders views.
//! - [`codec`]: whole-document encodings.
//! - [`extensions`]: custom node types layered over `vec`.

pub mod codec;
pub mod extensions;
pub mod model;
pub mod nodes;
pub mod options;

pub use model::api::{ApiError, ModelApi};
pub use model::{Model, ModelClock};
pub use options::ModelOptions;
