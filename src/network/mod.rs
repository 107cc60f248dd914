// Network fetch primitive, the only way the controller reaches the origin.

pub mod http_fetcher;
pub mod traits;
