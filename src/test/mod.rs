mod db;
mod logs;
pub mod utils;

pub use utils::test_utils;
