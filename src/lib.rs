pub mod allow_list;
pub mod config;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod normalize;
pub mod sync;
pub mod test_utils;
pub mod types;

pub use error::{SyncError, SyncResult};
