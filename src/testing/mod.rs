//! Test helpers shared by the unit tests

pub mod http_stub;

pub use http_stub::{StubResponse, StubServer};
