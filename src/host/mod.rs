// Worker host: sequences install and activate, dispatches fetches to the active worker.

pub mod lifecycle;
pub mod registration;
