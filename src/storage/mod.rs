// Host cache API: named buckets of request/response entries behind pluggable backends.

pub mod disk;
pub mod memory;
pub mod traits;
