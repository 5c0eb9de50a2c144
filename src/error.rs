use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Shared, thread-safe error object carried by a rejected promise.
pub type BoxError = Arc<dyn StdError + Send + Sync + 'static>;

/// Why a promise was rejected.
///
/// Cloning is cheap: every waiter on a rejected promise receives its own copy
/// of the same underlying error.
#[derive(Clone, thiserror::Error)]
pub enum Error {
    /// The executor or a chained handler called `reject`.
    #[error("{0}")]
    Rejected(BoxError),
    /// A panic carrying an error value was caught.
    #[error("panic recovery with error: {0}")]
    Panic(BoxError),
    /// A panic carrying anything else (usually a `&str` or `String`) was caught.
    #[error("panic recovery with unknown error: {0}")]
    UnknownPanic(String),
    /// The promise was resolved with itself.
    #[error("promise resolved with itself")]
    Cycle,
    /// The task backing the promise could not be started.
    #[error("failed to spawn promise task: {0}")]
    Spawn(String),
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

impl Error {
    /// Wrap any error as a user rejection.
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Error::Rejected(Arc::new(err))
    }

    /// A user rejection with only a message.
    ///
    /// ```
    /// use promise_chain::Error;
    /// assert_eq!(Error::msg("nope").to_string(), "nope");
    /// ```
    pub fn msg(message: impl Into<String>) -> Self {
        Error::new(Message(message.into()))
    }

    /// True when the error comes from a caught panic.
    pub fn is_panic(&self) -> bool {
        matches!(self, Error::Panic(_) | Error::UnknownPanic(_))
    }

    /// Borrow the wrapped error as `E`, if that is what was rejected with.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            Error::Rejected(err) | Error::Panic(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Turn a `catch_unwind` payload into a rejection.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send + 'static>) -> Self {
        let payload = match payload.downcast::<Error>() {
            Ok(err) => return Error::Panic(Arc::new(*err)),
            Err(other) => other,
        };
        let payload = match payload.downcast::<Box<dyn StdError + Send + Sync>>() {
            Ok(err) => return Error::Panic(Arc::from(*err)),
            Err(other) => other,
        };
        let payload = match payload.downcast::<std::io::Error>() {
            Ok(err) => return Error::Panic(Arc::new(*err)),
            Err(other) => other,
        };
        let payload = match payload.downcast::<&'static str>() {
            Ok(msg) => return Error::UnknownPanic((*msg).to_owned()),
            Err(other) => other,
        };
        match payload.downcast::<String>() {
            Ok(msg) => Error::UnknownPanic(*msg),
            Err(_) => Error::UnknownPanic("Box<dyn Any>".to_owned()),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Rejected(err) => f.debug_tuple("Rejected").field(&err.to_string()).finish(),
            Error::Panic(err) => f.debug_tuple("Panic").field(&err.to_string()).finish(),
            Error::UnknownPanic(msg) => f.debug_tuple("UnknownPanic").field(msg).finish(),
            Error::Cycle => f.write_str("Cycle"),
            Error::Spawn(msg) => f.debug_tuple("Spawn").field(msg).finish(),
        }
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::msg(message)
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::msg(message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(err)
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use std::io;
    use std::panic::{catch_unwind, panic_any};

    #[test]
    fn test_error_payload_panic() {
        let payload = catch_unwind(|| panic_any(Error::msg("boom"))).unwrap_err();
        let err = Error::from_panic(payload);
        assert!(err.is_panic());
        assert_eq!(err.to_string(), "panic recovery with error: boom");
    }

    #[test]
    fn test_io_error_payload_panic() {
        let payload =
            catch_unwind(|| panic_any(io::Error::new(io::ErrorKind::Other, "disk"))).unwrap_err();
        let err = Error::from_panic(payload);
        assert_eq!(err.to_string(), "panic recovery with error: disk");
        assert!(err.downcast_ref::<io::Error>().is_some());
    }

    #[test]
    fn test_str_payload_panic() {
        let payload = catch_unwind(|| panic!("boom")).unwrap_err();
        let err = Error::from_panic(payload);
        assert_eq!(err.to_string(), "panic recovery with unknown error: boom");
    }

    #[test]
    fn test_formatted_payload_panic() {
        let payload = catch_unwind(|| panic!("boom {}", 42)).unwrap_err();
        let err = Error::from_panic(payload);
        assert_eq!(err.to_string(), "panic recovery with unknown error: boom 42");
    }

    #[test]
    fn test_opaque_payload_panic() {
        let payload = catch_unwind(|| panic_any(7_u8)).unwrap_err();
        let err = Error::from_panic(payload);
        assert!(matches!(err, Error::UnknownPanic(_)));
    }

    #[test]
    fn test_downcast_user_error() {
        let err = Error::new(io::Error::new(io::ErrorKind::NotFound, "missing"));
        let inner = err.downcast_ref::<io::Error>().unwrap();
        assert_eq!(inner.kind(), io::ErrorKind::NotFound);
        assert!(!err.is_panic());
    }
}
