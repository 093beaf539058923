//! Typed registry of named callables.
//!
//! Subsystems that are built and torn down independently (the termination
//! ticker, telemetry sources, the coordinator) reach each other through the
//! bus instead of holding direct references. Calling a key that has no
//! registration is a no-op that returns `None`.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use crate::device::DeviceId;
use crate::session::StopReason;

/// Name plus call signature of a bus entry.
pub struct BusKey<A, R> {
    name: &'static str,
    _signature: PhantomData<fn(A) -> R>,
}

impl<A, R> BusKey<A, R> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _signature: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// Ask the active session to stop. Returns whether the request was queued.
pub const REQUEST_STOP: BusKey<StopReason, bool> = BusKey::new("session.request_stop");

/// Report that a device stopped on its own. Returns whether it was queued.
pub const DEVICE_STOPPED: BusKey<DeviceId, bool> = BusKey::new("session.device_stopped");

type Callable<A, R> = Arc<dyn Fn(A) -> R + Send + Sync>;

#[derive(Default)]
pub struct CoordinationBus {
    slots: RwLock<HashMap<&'static str, Arc<dyn Any + Send + Sync>>>,
}

impl CoordinationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `f` under `key`, replacing any previous registration.
    pub fn register<A, R, F>(&self, key: &BusKey<A, R>, f: F)
    where
        A: 'static,
        R: 'static,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        let callable: Callable<A, R> = Arc::new(f);
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.insert(key.name, Arc::new(callable)).is_some() {
            tracing::debug!(key = key.name, "Replaced bus registration");
        }
    }

    pub fn unregister<A, R>(&self, key: &BusKey<A, R>) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.remove(key.name);
    }

    pub fn is_registered<A, R>(&self, key: &BusKey<A, R>) -> bool {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.contains_key(key.name)
    }

    /// Invoke the callable registered under `key`. Returns `None` when
    /// nothing is registered or the registration has another signature.
    pub fn call<A, R>(&self, key: &BusKey<A, R>, args: A) -> Option<R>
    where
        A: 'static,
        R: 'static,
    {
        // Clone the callable out so it runs without the lock held.
        let slot = {
            let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
            slots.get(key.name).cloned()
        }?;
        let Some(callable) = slot.downcast_ref::<Callable<A, R>>().cloned() else {
            tracing::warn!(key = key.name, "Bus registration has a different signature");
            return None;
        };
        Some(callable(args))
    }
}

impl std::fmt::Debug for CoordinationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<_> = slots.keys().collect();
        keys.sort();
        f.debug_struct("CoordinationBus").field("keys", &keys).finish()
    }
}

/// Optional callback that yields `R::default()` when unset.
pub struct Callback<A, R = ()> {
    inner: Option<Callable<A, R>>,
}

impl<A, R> Callback<A, R> {
    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn new<F>(f: F) -> Self
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        Self {
            inner: Some(Arc::new(f)),
        }
    }

    pub fn is_set(&self) -> bool {
        self.inner.is_some()
    }
}

impl<A, R: Default> Callback<A, R> {
    pub fn invoke(&self, args: A) -> R {
        match self.inner {
            Some(ref f) => f(args),
            None => R::default(),
        }
    }
}

impl<A, R> Default for Callback<A, R> {
    fn default() -> Self {
        Self::none()
    }
}

impl<A, R> Clone for Callback<A, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A, R> std::fmt::Debug for Callback<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callback").field("set", &self.is_set()).finish()
    }
}
