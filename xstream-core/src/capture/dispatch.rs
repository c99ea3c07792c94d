//! Frame-tick dispatcher.
//!
//! Host glue owns the host's real per-frame callback and forwards each
//! invocation to [`TickDispatcher::fire`]. Subsystems register plain
//! closures here instead of talking to the host's callback API.

use crate::capture::host::TextureHost;

/// Handle returned by [`TickDispatcher::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickId(u64);

type TickHandler = Box<dyn FnMut(&dyn TextureHost, f64) + Send>;

/// Ordered list of frame-tick handlers.
#[derive(Default)]
pub struct TickDispatcher {
    next_id: u64,
    handlers: Vec<(TickId, TickHandler)>,
}

impl TickDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler; handlers run in registration order.
    pub fn register<F>(&mut self, handler: F) -> TickId
    where
        F: FnMut(&dyn TextureHost, f64) + Send + 'static,
    {
        let id = TickId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unregister(&mut self, id: TickId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        self.handlers.len() != before
    }

    /// Run every handler for one host frame at host time `now`.
    pub fn fire(&mut self, host: &dyn TextureHost, now: f64) {
        for (_, handler) in &mut self.handlers {
            handler(host, now);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for TickDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickDispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::host::MemoryHost;
    use std::sync::{Arc, Mutex};

    #[test]
    fn fires_in_registration_order() {
        let host = MemoryHost::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = TickDispatcher::new();

        for tag in ["a", "b"] {
            let log = Arc::clone(&log);
            dispatcher.register(move |_, now| log.lock().unwrap().push((tag, now)));
        }
        dispatcher.fire(&host, 1.5);

        assert_eq!(*log.lock().unwrap(), vec![("a", 1.5), ("b", 1.5)]);
    }

    #[test]
    fn unregister_removes_only_that_handler() {
        let host = MemoryHost::new();
        let count = Arc::new(Mutex::new(0));
        let mut dispatcher = TickDispatcher::new();

        let c = Arc::clone(&count);
        let first = dispatcher.register(move |_, _| *c.lock().unwrap() += 1);
        let c = Arc::clone(&count);
        dispatcher.register(move |_, _| *c.lock().unwrap() += 10);

        assert!(dispatcher.unregister(first));
        assert!(!dispatcher.unregister(first));
        dispatcher.fire(&host, 0.0);

        assert_eq!(*count.lock().unwrap(), 10);
        assert_eq!(dispatcher.len(), 1);
    }
}
