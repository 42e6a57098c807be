pub mod logs;
pub mod qth;
pub mod sessions;
pub mod users;

pub use logs::*;
pub use qth::*;
pub use sessions::*;
pub use users::*;
