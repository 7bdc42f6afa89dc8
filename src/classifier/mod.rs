//! Classification stages.
//!
//! A stage binds one [`ChunkClassifier`](crate::pipeline::ChunkClassifier) to
//! one output handle and runs it once over an input source. Two front-ends are
//! provided: [`CatClassifier`] for tabular catalogues and [`PzClassifier`] for
//! redshift densities.

mod catalog;
mod pz;
mod stage;


pub use catalog::CatClassifier;
pub use pz::PzClassifier;
pub use stage::{InputBinding, Stage};
