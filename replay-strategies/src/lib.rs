//! Reference strategies, allocators, and broker models for the replay
//! engine. Everything here implements the collaborator traits from
//! `replay-core` and can be swapped for user code.

pub mod donchian;
