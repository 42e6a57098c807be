pub mod authentication;
pub mod permissions;
pub mod policy;
pub mod token;
pub mod user;

pub use authentication::*;
pub use permissions::*;
pub use token::*;
pub use user::*;
