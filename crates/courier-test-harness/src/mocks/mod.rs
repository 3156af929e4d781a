//! Mock servers for tests.

pub mod network;
