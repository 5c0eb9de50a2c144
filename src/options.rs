//! Promise task options

use std::thread;

use crate::promise::{Promise, Rejecter, Resolver};
use crate::Error;

/// Options for the thread that runs a promise's executor.
///
/// ```
/// use promise_chain::Options;
/// let promise = Options::new()
///     .name("answer")
///     .create(|_reject, resolve| resolve.resolve(42));
/// assert_eq!(promise.wait().unwrap(), 42);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub stack_size: Option<usize>,
    pub name: Option<String>,
}

impl Options {
    pub fn new() -> Options {
        Options {
            stack_size: None,
            name: None,
        }
    }

    pub fn stack_size(mut self, size: usize) -> Options {
        self.stack_size = Some(size);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Options {
        self.name = Some(name.into());
        self
    }

    /// Create a promise whose executor runs on a thread built from these options.
    pub fn create<T, F>(&self, executor: F) -> Promise<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(Rejecter<T>, Resolver<T>) + Send + 'static,
    {
        Promise::spawn_with(self, executor)
    }

    pub(crate) fn spawn<F>(&self, task: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut builder = thread::Builder::new();
        if let Some(ref name) = self.name {
            builder = builder.name(name.clone());
        }
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        builder
            .spawn(task)
            .map(|_| ())
            .map_err(|err| Error::Spawn(err.to_string()))
    }
}
