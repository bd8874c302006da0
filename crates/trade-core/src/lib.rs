pub mod decision;
pub mod error;
pub mod intent;
pub mod log;
pub mod numeric;
pub mod order;

pub use decision::*;
pub use error::*;
pub use intent::*;
pub use log::*;
pub use order::*;
