pub mod agents;
pub mod cpu;
pub mod driver;
pub mod field;

pub use agents::*;
pub use driver::*;
pub use field::*;
