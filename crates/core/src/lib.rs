pub mod credentials;
pub mod models;
pub mod traits;

pub use credentials::*;
pub use models::*;
pub use traits::*;
