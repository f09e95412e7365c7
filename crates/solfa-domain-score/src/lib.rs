pub mod error;
pub mod measures;
pub mod model;
pub mod tempo_map;

pub use error::*;
pub use measures::*;
pub use model::*;
pub use tempo_map::*;
