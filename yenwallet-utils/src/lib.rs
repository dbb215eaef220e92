pub use self::data_url::*;
pub use self::serde_helpers::*;
pub use self::traits::*;

mod data_url;
mod serde_helpers;
mod traits;
