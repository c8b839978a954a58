pub mod error;
pub mod movies;
pub mod types;

pub use error::ApiError;
pub use movies::*;
pub use types::*;
