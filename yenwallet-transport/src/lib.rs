//! Native host implementations for the `yenwallet` core.

pub use self::demo::DemoConnection;
pub use self::http::{ClientSettings, HttpClient};
pub use self::storage::{FileStorage, MemoryStorage};

mod demo;
mod http;
mod storage;
