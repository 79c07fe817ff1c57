//! Shared fixtures for the cosim integration tests

pub mod sim_device;
