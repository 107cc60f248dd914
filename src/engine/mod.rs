// Engine: the cache controller and the pieces it is built from.

pub mod controller;
pub mod precache;
pub mod stats;
