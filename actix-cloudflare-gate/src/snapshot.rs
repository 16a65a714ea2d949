use std::sync::Arc;

use actix_utils::future::{Ready, ready};
use actix_web::{Error, FromRequest, HttpRequest, dev, error};
use arc_swap::{ArcSwap, Guard};
use tracing::debug;

/// Shared, atomically replaceable configuration.
///
/// Middleware in this crate load a snapshot once per request, so a request is always handled
/// against a single consistent value even if [`store`](Self::store) is called concurrently.
/// Clones share the same underlying value.
///
/// Can also be placed in app data and used as an extractor.
///
/// # Examples
/// ```
/// use actix_cloudflare_gate::{DenialPolicy, Snapshot};
///
/// let policy = Snapshot::new(DenialPolicy::default());
///
/// let handle = policy.clone();
/// handle.update(|policy| policy.clone().blocked_message("Go away"));
///
/// assert_eq!(policy.load().message(), "Go away");
/// ```
#[derive(Debug)]
pub struct Snapshot<T> {
    swap: Arc<ArcSwap<T>>,
}

impl<T> Snapshot<T> {
    /// Constructs new shared value.
    pub fn new(item: T) -> Self {
        Self {
            swap: Arc::new(ArcSwap::new(Arc::new(item))),
        }
    }

    /// Returns a temporary access guard to the current value.
    ///
    /// Implements `Deref` for read access to the inner value.
    pub fn load(&self) -> Guard<Arc<T>> {
        self.swap.load()
    }

    /// Replaces the value.
    ///
    /// Further `load`s will yield the new value. Outstanding guards keep the old one.
    pub fn store(&self, item: T) {
        self.swap.store(Arc::new(item))
    }

    /// Replaces the value with one derived from the current value.
    ///
    /// `f` may be called more than once if other writers race with this update.
    pub fn update(&self, mut f: impl FnMut(&T) -> T) {
        self.swap.rcu(|current| Arc::new(f(&**current)));
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            swap: Arc::clone(&self.swap),
        }
    }
}

impl<T: Default> Default for Snapshot<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for Snapshot<T> {
    fn from(item: T) -> Self {
        Self::new(item)
    }
}

impl<T: 'static> FromRequest for Snapshot<T> {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _pl: &mut dev::Payload) -> Self::Future {
        if let Some(data) = req.app_data::<Snapshot<T>>() {
            ready(Ok(data.clone()))
        } else {
            debug!(
                "Failed to extract `Snapshot<{}>` for `{}` handler. Wrap the value with \
                `Snapshot::new()` and pass it to `App::app_data()`.",
                core::any::type_name::<T>(),
                req.match_name().unwrap_or_else(|| req.path())
            );

            ready(Err(error::ErrorInternalServerError(
                "Requested application data is not configured correctly. \
                View/enable debug logs for more details.",
            )))
        }
    }
}
