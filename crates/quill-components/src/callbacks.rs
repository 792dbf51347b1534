//! Streaming callbacks and the registry that names them.
//!
//! A callback is configuration, so it has to survive a round trip through
//! [`ComponentDescriptor`](crate::ComponentDescriptor). Callbacks registered
//! in a [`CallbackRegistry`] carry their registry name; serialization writes
//! that name and deserialization looks it up again. Closures that were never
//! registered serialize as [`ANONYMOUS_CALLBACK`], which never resolves.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use tracing::debug;

use crate::error::{ComponentError, Result};
use crate::generators::StreamingChunk;

/// Reference written for callbacks that have no registered name.
pub const ANONYMOUS_CALLBACK: &str = "<anonymous>";

/// Registry name of [`default_streaming_callback`].
pub const DEFAULT_STREAMING_CALLBACK: &str =
    "quill_components::callbacks::default_streaming_callback";

type CallbackFn = dyn Fn(&StreamingChunk) + Send + Sync;

/// A function invoked once per streamed fragment.
#[derive(Clone)]
pub struct StreamingCallback {
    name: Option<String>,
    func: Arc<CallbackFn>,
}

impl StreamingCallback {
    /// Wrap a closure without a name. It serializes as [`ANONYMOUS_CALLBACK`].
    pub fn new(func: impl Fn(&StreamingChunk) + Send + Sync + 'static) -> Self {
        Self {
            name: None,
            func: Arc::new(func),
        }
    }

    /// Wrap a closure under `name`.
    pub fn named(
        name: impl Into<String>,
        func: impl Fn(&StreamingChunk) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: Some(name.into()),
            func: Arc::new(func),
        }
    }

    /// The registered name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The string this callback serializes as.
    pub fn reference(&self) -> &str {
        self.name.as_deref().unwrap_or(ANONYMOUS_CALLBACK)
    }

    /// Invoke the callback.
    pub fn call(&self, chunk: &StreamingChunk) {
        (self.func)(chunk)
    }

    /// True if both handles wrap the same function value.
    pub fn same_fn(&self, other: &StreamingCallback) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for StreamingCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StreamingCallback")
            .field(&self.reference())
            .finish()
    }
}

/// Prints each fragment's content to stdout as it arrives.
pub fn default_streaming_callback(chunk: &StreamingChunk) {
    let mut stdout = std::io::stdout().lock();
    // A closed stdout must not abort generation.
    let _ = write!(stdout, "{}", chunk.content);
    let _ = stdout.flush();
}

/// Name → callback lookup used when deserializing components.
#[derive(Debug, Clone, Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, StreamingCallback>,
}

impl CallbackRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in callbacks.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(DEFAULT_STREAMING_CALLBACK, default_streaming_callback);
        registry
    }

    /// Register `func` under `name`, replacing any previous entry, and
    /// return the named handle.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        func: impl Fn(&StreamingChunk) + Send + Sync + 'static,
    ) -> StreamingCallback {
        let callback = StreamingCallback::named(name, func);
        self.insert(callback.clone());
        callback
    }

    /// Insert an already-named callback. Anonymous callbacks are ignored.
    pub fn insert(&mut self, callback: StreamingCallback) {
        let Some(name) = callback.name().map(str::to_owned) else {
            debug!("ignoring anonymous callback registration");
            return;
        };
        if self.callbacks.insert(name.clone(), callback).is_some() {
            debug!(callback = %name, "replaced registered callback");
        }
    }

    /// Look up a callback by name.
    pub fn get(&self, name: &str) -> Option<StreamingCallback> {
        self.callbacks.get(name).cloned()
    }

    /// Look up a callback by name, failing if it is not registered.
    pub fn resolve(&self, name: &str) -> Result<StreamingCallback> {
        self.get(name)
            .ok_or_else(|| ComponentError::UnknownCallback(name.to_owned()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.callbacks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunk(content: &str) -> StreamingChunk {
        StreamingChunk {
            content: content.into(),
            index: 0,
            model: "gpt-3.5-turbo".into(),
            finish_reason: None,
        }
    }

    #[test]
    fn anonymous_callback_reference() {
        let cb = StreamingCallback::new(|_| {});
        assert!(cb.name().is_none());
        assert_eq!(cb.reference(), ANONYMOUS_CALLBACK);
    }

    #[test]
    fn named_callback_is_invoked() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let cb = StreamingCallback::named("count", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        cb.call(&chunk("a"));
        cb.call(&chunk("b"));

        assert_eq!(cb.reference(), "count");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn builtins_contain_default_callback() {
        let registry = CallbackRegistry::with_builtins();
        assert!(registry.contains(DEFAULT_STREAMING_CALLBACK));
        assert_eq!(registry.names(), vec![DEFAULT_STREAMING_CALLBACK]);

        let cb = registry.resolve(DEFAULT_STREAMING_CALLBACK).unwrap();
        assert_eq!(cb.reference(), DEFAULT_STREAMING_CALLBACK);
    }

    #[test]
    fn resolve_returns_the_registered_function() {
        let mut registry = CallbackRegistry::new();
        let registered = registry.register("mine", |_| {});

        let resolved = registry.resolve("mine").unwrap();
        assert!(resolved.same_fn(&registered));
        assert!(!resolved.same_fn(&StreamingCallback::new(|_| {})));
    }

    #[test]
    fn resolve_unknown_fails() {
        let registry = CallbackRegistry::with_builtins();
        let err = registry.resolve("nope::callback").unwrap_err();
        assert!(matches!(err, ComponentError::UnknownCallback(ref n) if n == "nope::callback"));
    }

    #[test]
    fn anonymous_sentinel_never_resolves() {
        let mut registry = CallbackRegistry::new();
        registry.insert(StreamingCallback::new(|_| {}));
        assert!(registry.names().is_empty());
        assert!(registry.resolve(ANONYMOUS_CALLBACK).is_err());
    }

    #[test]
    fn register_replaces_existing_entry() {
        let mut registry = CallbackRegistry::new();
        let first = registry.register("cb", |_| {});
        let second = registry.register("cb", |_| {});

        let resolved = registry.resolve("cb").unwrap();
        assert!(resolved.same_fn(&second));
        assert!(!resolved.same_fn(&first));
    }
}
