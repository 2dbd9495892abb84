//! Decoded event types

pub mod events;
