//! The promise cell, its settlement protocol and chaining.
//!
//! Every promise is a handle onto one shared `Inner` behind a mutex. The only
//! writers are the settlement paths (`Resolver`, `Rejecter`, panic recovery);
//! the first of them to find the promise pending wins and every later attempt
//! is ignored. Waiters park on a condvar (threads) or leave a waker (async)
//! and are all released by the same settlement, under the same lock that
//! wrote the outcome.

use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use log::{debug, trace, warn};

use crate::{Error, Options, Status};

/// What a promise is resolved with: a plain value, or another promise whose
/// outcome is adopted once it settles.
#[derive(Debug)]
pub enum Resolution<T> {
    Value(T),
    Promise(Promise<T>),
}

impl<T> From<Promise<T>> for Resolution<T> {
    fn from(promise: Promise<T>) -> Self {
        Resolution::Promise(promise)
    }
}

enum State<T> {
    Pending,
    /// Resolved with a nested promise that has not settled yet.
    Adopting,
    Fulfilled(T),
    Rejected(Error),
}

struct Inner<T> {
    state: State<T>,
    waker: Vec<Waker>,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    settled: Condvar,
}

/// The eventual outcome of a computation running on its own thread.
///
/// Handles are cheap to clone and all observe the same settlement.
///
/// # Examples
///
/// ```
/// use promise_chain::{Promise, Resolution};
///
/// let promise = Promise::new(|_reject, resolve| resolve.resolve(2))
///     .then(|v| Resolution::Value(v * 10), |_err| Resolution::Value(0))
///     .then(|v| Resolution::Value(v + 5), |_err| Resolution::Value(0));
/// assert_eq!(promise.wait().unwrap(), 25);
/// ```
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

/// Settles a promise with a value or a nested promise.
pub struct Resolver<T> {
    promise: Promise<T>,
}

/// Settles a promise with an error.
pub struct Rejecter<T> {
    promise: Promise<T>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T> Clone for Rejecter<T> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("status", &self.status())
            .finish()
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resolver").field(&self.promise).finish()
    }
}

impl<T> fmt::Debug for Rejecter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Rejecter").field(&self.promise).finish()
    }
}

impl<T> Promise<T> {
    fn pending() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: State::Pending,
                    waker: vec![],
                }),
                settled: Condvar::new(),
            }),
        }
    }

    // State writes never panic, so a poisoned lock still guards a coherent state.
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ptr_eq(&self, other: &Promise<T>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Current status. A promise adopting a nested promise is still pending.
    pub fn status(&self) -> Status {
        match self.lock().state {
            State::Pending | State::Adopting => Status::Pending,
            State::Fulfilled(_) => Status::Fulfilled,
            State::Rejected(_) => Status::Rejected,
        }
    }

    /// Settle from `Pending` only; returns whether this call won.
    fn try_settle(&self, outcome: State<T>) -> bool {
        let inner = self.lock();
        if !matches!(inner.state, State::Pending) {
            debug!("promise already resolved, ignoring settlement");
            return false;
        }
        self.complete(inner, outcome);
        true
    }

    fn complete(&self, mut inner: MutexGuard<'_, Inner<T>>, outcome: State<T>) {
        trace!(
            "promise settled as {}",
            if matches!(outcome, State::Rejected(_)) {
                "rejected"
            } else {
                "fulfilled"
            }
        );
        inner.state = outcome;
        self.shared.settled.notify_all();
        for waker in inner.waker.drain(..) {
            waker.wake()
        }
    }

    fn reject(&self, err: Error) {
        self.try_settle(State::Rejected(err));
    }

    fn recover(&self, payload: Box<dyn std::any::Any + Send + 'static>) {
        let err = Error::from_panic(payload);
        warn!("promise task panicked: {}", err);
        self.reject(err);
    }

    /// Block the calling thread until the promise leaves the pending state.
    fn block_until_settled(&self) -> MutexGuard<'_, Inner<T>> {
        let inner = self.lock();
        self.shared
            .settled
            .wait_while(inner, |inner| {
                matches!(inner.state, State::Pending | State::Adopting)
            })
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    /// Create a promise and run `executor` on a new thread.
    ///
    /// The executor receives a [`Rejecter`] and a [`Resolver`]; the first
    /// settlement it makes sticks. A panic inside the executor rejects the
    /// promise instead of unwinding further.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::Promise;
    ///
    /// let ok = Promise::new(|_reject, resolve| resolve.resolve("🍓"));
    /// assert_eq!(ok.wait().unwrap(), "🍓");
    ///
    /// let failed = Promise::<()>::new(|reject, _resolve| reject.reject("💥"));
    /// assert_eq!(failed.wait().unwrap_err().to_string(), "💥");
    ///
    /// let panicked = Promise::<()>::new(|_reject, _resolve| panic!("boom"));
    /// let err = panicked.wait().unwrap_err();
    /// assert_eq!(err.to_string(), "panic recovery with unknown error: boom");
    /// ```
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Rejecter<T>, Resolver<T>) + Send + 'static,
    {
        Self::spawn_with(&Options::default(), executor)
    }

    pub(crate) fn spawn_with<F>(options: &Options, executor: F) -> Self
    where
        F: FnOnce(Rejecter<T>, Resolver<T>) + Send + 'static,
    {
        let promise = Promise::pending();
        let reject = Rejecter {
            promise: promise.clone(),
        };
        let resolve = Resolver {
            promise: promise.clone(),
        };
        let task = promise.clone();
        trace!("spawning promise task {:?}", options.name);
        let spawned = options.spawn(move || {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(move || executor(reject, resolve)))
            {
                task.recover(payload);
            }
        });
        if let Err(err) = spawned {
            warn!("{}", err);
            promise.reject(err);
        }
        promise
    }

    /// An already fulfilled promise. No thread is spawned.
    pub fn resolved(value: T) -> Self {
        let promise = Promise::pending();
        promise.try_settle(State::Fulfilled(value));
        promise
    }

    /// An already rejected promise. No thread is spawned.
    pub fn rejected(err: impl Into<Error>) -> Self {
        let promise = Promise::pending();
        promise.reject(err.into());
        promise
    }

    fn resolve(&self, resolution: Resolution<T>) {
        match resolution {
            Resolution::Value(value) => {
                self.try_settle(State::Fulfilled(value));
            }
            Resolution::Promise(nested) => self.adopt(nested),
        }
    }

    /// Lock this promise in to `nested` and settle once `nested` does. The
    /// state lock is released while waiting.
    fn adopt(&self, nested: Promise<T>) {
        if self.ptr_eq(&nested) {
            self.reject(Error::Cycle);
            return;
        }
        {
            let mut inner = self.lock();
            if !matches!(inner.state, State::Pending) {
                debug!("promise already resolved, ignoring nested promise");
                return;
            }
            inner.state = State::Adopting;
        }
        debug!("waiting on nested promise");
        let outcome = match nested.wait() {
            Ok(value) => State::Fulfilled(value),
            Err(err) => State::Rejected(err),
        };
        let inner = self.lock();
        if matches!(inner.state, State::Adopting) {
            self.complete(inner, outcome);
        }
    }

    /// Block the calling thread until the promise settles and return a copy of
    /// its outcome.
    pub fn wait(&self) -> Result<T, Error> {
        let inner = self.block_until_settled();
        match inner.state {
            State::Fulfilled(ref value) => Ok(value.clone()),
            State::Rejected(ref err) => Err(err.clone()),
            State::Pending | State::Adopting => unreachable!("woken before settlement"),
        }
    }

    /// The fulfilled value, if the promise has been fulfilled.
    pub fn result(&self) -> Option<T> {
        match self.lock().state {
            State::Fulfilled(ref value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The rejection, if the promise has been rejected.
    pub fn error(&self) -> Option<Error> {
        match self.lock().state {
            State::Rejected(ref err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Chain a continuation.
    ///
    /// Returns at once with a new promise. A separate task waits for this
    /// promise to settle and resolves the new one with `on_fulfilled(value)`
    /// or `on_rejected(error)`. Either handler may return a promise, which is
    /// then adopted.
    pub fn then<U, F, G>(&self, on_fulfilled: F, on_rejected: G) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Resolution<U> + Send + 'static,
        G: FnOnce(Error) -> Resolution<U> + Send + 'static,
    {
        self.chain(Some(on_fulfilled), on_rejected)
    }

    /// Handle a rejection.
    ///
    /// `on_rejected` runs only if this promise is rejected. If this promise is
    /// fulfilled instead, the returned promise never settles.
    pub fn catch<U, G>(&self, on_rejected: G) -> Promise<U>
    where
        U: Clone + Send + 'static,
        G: FnOnce(Error) -> Resolution<U> + Send + 'static,
    {
        self.chain(None::<fn(T) -> Resolution<U>>, on_rejected)
    }

    fn chain<U, F, G>(&self, on_fulfilled: Option<F>, on_rejected: G) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Resolution<U> + Send + 'static,
        G: FnOnce(Error) -> Resolution<U> + Send + 'static,
    {
        let source = self.clone();
        Promise::new(move |_reject, resolve| match source.wait() {
            Err(err) => resolve.settle(on_rejected(err)),
            Ok(value) => match on_fulfilled {
                Some(on_fulfilled) => resolve.settle(on_fulfilled(value)),
                None => debug!("no fulfillment handler, chained promise stays pending"),
            },
        })
    }

    /// Run `on_settled` on its own thread once this promise settles, whatever
    /// the outcome. Returns this promise, so chaining after `finally` sees the
    /// original outcome.
    pub fn finally<F, R>(&self, on_settled: F) -> Promise<T>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let source = self.clone();
        let observer = Options::default().spawn(move || {
            drop(source.block_until_settled());
            if let Err(payload) = catch_unwind(AssertUnwindSafe(on_settled)) {
                warn!("finally callback panicked: {}", Error::from_panic(payload));
            }
        });
        if let Err(err) = observer {
            warn!("finally callback dropped: {}", err);
        }
        self.clone()
    }
}

impl<T> Future for Promise<T>
where
    T: Clone,
{
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.lock();
        match inner.state {
            State::Fulfilled(ref value) => Poll::Ready(Ok(value.clone())),
            State::Rejected(ref err) => Poll::Ready(Err(err.clone())),
            State::Pending | State::Adopting => {
                if !inner.waker.iter().any(|w| w.will_wake(cx.waker())) {
                    inner.waker.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T> Resolver<T>
where
    T: Clone + Send + 'static,
{
    /// Fulfil with `value`. Ignored if the promise is already resolved.
    pub fn resolve(&self, value: T) {
        self.promise.resolve(Resolution::Value(value))
    }

    /// Adopt the outcome of `nested`, blocking the calling thread until it
    /// settles.
    pub fn resolve_with(&self, nested: Promise<T>) {
        self.promise.resolve(Resolution::Promise(nested))
    }

    pub fn settle(&self, resolution: Resolution<T>) {
        self.promise.resolve(resolution)
    }
}

impl<T> Rejecter<T> {
    /// Reject with `err`. Ignored if the promise is already resolved.
    pub fn reject(&self, err: impl Into<Error>) {
        self.promise.reject(err.into())
    }
}
