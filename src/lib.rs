//! Thread-backed promises.
//!
//! A [`Promise`] is created from an executor that runs on its own thread and
//! settles the promise exactly once, through a [`Resolver`] or a [`Rejecter`].
//! Continuations are attached with [`Promise::then`], [`Promise::catch`] and
//! [`Promise::finally`]; each runs on its own thread once the source settles.
//! A panic in an executor or handler rejects the promise it was driving.
//!
//! ```
//! use promise_chain::{Promise, Resolution};
//!
//! let greeting = Promise::new(|_reject, resolve| resolve.resolve("hello"))
//!     .then(|v| Resolution::Value(format!("{v}, world")), |err| Resolution::Value(err.to_string()));
//! assert_eq!(greeting.wait().unwrap(), "hello, world");
//! ```

mod error;
pub mod options;
pub mod promise;

pub use error::{BoxError, Error};
pub use options::Options;
pub use promise::{Promise, Rejecter, Resolution, Resolver};

/// Observable state of a [`Promise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Fulfilled,
    Rejected,
}
