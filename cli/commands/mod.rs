mod flows;
mod make;

pub use flows::*;
pub use make::*;
