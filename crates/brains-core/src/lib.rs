pub mod call;
pub mod constants;
pub mod error;
pub mod position;
pub mod types;

pub use call::*;
pub use constants::*;
pub use error::{BrainsError, ErrorKind};
pub use position::*;
pub use types::*;
