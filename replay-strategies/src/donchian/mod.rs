//! Donchian channel breakout: weekly-channel strategy, long-only allocator,
//! and a fill-at-next-open broker with IBKR-style commission schedules.

pub mod allocator;
pub mod broker;
pub mod strategy;

pub use allocator::LongOnlyAllocator;
pub use broker::{FeeSchedule, NextOpenBroker};
pub use strategy::DonchianStrategy;
