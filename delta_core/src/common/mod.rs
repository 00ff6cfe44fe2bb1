pub mod enums;
pub mod stats_error;
pub mod time;
pub mod utils;
