//! Helpers shared by unit tests.

pub mod memory_storage;
pub mod scripted_transport;
pub mod socket_guard;
