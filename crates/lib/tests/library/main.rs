//! Integration tests for distrogen-lib, exercised through the public API.

mod common;
mod manifest_tests;
mod mountpoint_tests;
mod registry_tests;
