pub mod analysis;
pub mod market;
pub mod position;
pub mod prediction;
pub mod signals;

pub use analysis::*;
pub use market::*;
pub use position::*;
pub use prediction::*;
pub use signals::*;
