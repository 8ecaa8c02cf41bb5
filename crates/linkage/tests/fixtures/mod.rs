//! Test fixtures for linkage integration tests.

#[allow(dead_code)]
pub mod memory;
pub mod schema;

pub use memory::MemoryConnection;
pub use schema::registry;

use linkage::{Error, Outcome};

#[allow(dead_code)]
pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

#[allow(dead_code)]
pub fn expect_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => panic!("expected an error, got {other:?}"),
    }
}
