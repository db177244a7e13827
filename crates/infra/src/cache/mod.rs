//! Process-local caches

mod busy_blocks;

pub use busy_blocks::BusyBlockCache;
