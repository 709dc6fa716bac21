pub mod domain;
pub mod errors;
pub mod experiment;
pub mod molecule;

pub use domain::*;
pub use errors::*;
pub use experiment::*;
pub use molecule::*;
