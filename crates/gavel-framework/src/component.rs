//! Button and select-menu callbacks.
//!
//! A module that sends a message with components registers one callback per
//! component and puts the returned id on the component. The platform echoes
//! that id back in a [`ComponentEvent`](gavel_core::ComponentEvent), and the
//! dispatcher looks the callback up here.
//!
//! Callbacks live until their staleness check says otherwise. The runtime
//! calls [`ComponentRegistry::sweep`] periodically to drop stale ones.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::FutureExt;
use futures::future::BoxFuture;
use gavel_core::{ComponentKind, Permission};
use parking_lot::Mutex;
use tracing::debug;

use crate::context::ComponentContext;
use crate::error::CommandResult;

/// Type-erased component handler.
pub type ComponentFn =
    Arc<dyn Fn(ComponentContext) -> BoxFuture<'static, CommandResult> + Send + Sync>;

/// Whether a callback can be dropped.
pub type StaleCheck = Box<dyn Fn() -> bool + Send + Sync>;

/// One registered component callback.
pub struct ComponentCallback {
    kind: ComponentKind,
    permission: Permission,
    is_stale: StaleCheck,
    invoke: ComponentFn,
}

impl ComponentCallback {
    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn permission(&self) -> &Permission {
        &self.permission
    }

    pub fn is_stale(&self) -> bool {
        (self.is_stale)()
    }

    pub fn invoke(&self, ctx: ComponentContext) -> BoxFuture<'static, CommandResult> {
        (self.invoke)(ctx)
    }
}

impl fmt::Debug for ComponentCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentCallback")
            .field("kind", &self.kind)
            .field("permission", &self.permission)
            .finish_non_exhaustive()
    }
}

/// Callbacks keyed by component id.
pub struct ComponentRegistry {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<String, Arc<ComponentCallback>>>,
}

impl ComponentRegistry {
    /// Ids start at the current Unix time in milliseconds, so ids handed out
    /// before a restart are not reused right after it.
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX / 2))
            .unwrap_or_default();
        Self::starting_at(seed)
    }

    pub fn starting_at(seed: u64) -> Self {
        Self {
            next_id: AtomicU64::new(seed),
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a button callback and returns its id.
    pub fn button<S, F, Fut>(&self, permission: Permission, is_stale: S, handler: F) -> String
    where
        S: Fn() -> bool + Send + Sync + 'static,
        F: Fn(ComponentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult> + Send + 'static,
    {
        self.register(ComponentKind::Button, permission, is_stale, handler)
    }

    /// Registers a select-menu callback and returns its id.
    pub fn select<S, F, Fut>(&self, permission: Permission, is_stale: S, handler: F) -> String
    where
        S: Fn() -> bool + Send + Sync + 'static,
        F: Fn(ComponentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult> + Send + 'static,
    {
        self.register(ComponentKind::Select, permission, is_stale, handler)
    }

    fn register<S, F, Fut>(
        &self,
        kind: ComponentKind,
        permission: Permission,
        is_stale: S,
        handler: F,
    ) -> String
    where
        S: Fn() -> bool + Send + Sync + 'static,
        F: Fn(ComponentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult> + Send + 'static,
    {
        let label = match kind {
            ComponentKind::Button => "Button",
            ComponentKind::Select => "Select",
        };
        let id = format!("{label}-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let invoke: ComponentFn = Arc::new(move |ctx| handler(ctx).boxed());
        let callback = ComponentCallback {
            kind,
            permission,
            is_stale: Box::new(is_stale),
            invoke,
        };
        self.callbacks.lock().insert(id.clone(), Arc::new(callback));
        id
    }

    pub fn get(&self, id: &str) -> Option<Arc<ComponentCallback>> {
        self.callbacks.lock().get(id).cloned()
    }

    /// Drops a callback before it goes stale.
    pub fn remove(&self, id: &str) -> bool {
        self.callbacks.lock().remove(id).is_some()
    }

    /// Drops every stale callback and returns how many went.
    pub fn sweep(&self) -> usize {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|_, callback| !callback.is_stale());
        let removed = before - callbacks.len();
        if removed > 0 {
            debug!(removed, remaining = callbacks.len(), "Swept stale component callbacks");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("callbacks", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn noop(_ctx: ComponentContext) -> impl Future<Output = CommandResult> + Send {
        async { Ok(()) }
    }

    #[test]
    fn test_ids_are_labelled_and_sequential() {
        let registry = ComponentRegistry::starting_at(40);
        let first = registry.button(Permission::Everyone, || false, noop);
        let second = registry.select(Permission::Everyone, || false, noop);
        assert_eq!(first, "Button-40");
        assert_eq!(second, "Select-41");
        assert_eq!(registry.get(&second).map(|c| c.kind()), Some(ComponentKind::Select));
        assert!(registry.get("Button-41").is_none());
    }

    #[test]
    fn test_sweep_drops_only_stale_callbacks() {
        let registry = ComponentRegistry::new();
        let expired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&expired);
        let short = registry.button(
            Permission::Everyone,
            move || flag.load(Ordering::Acquire),
            noop,
        );
        let long = registry.button(Permission::named("poll.vote"), || false, noop);

        assert_eq!(registry.sweep(), 0);
        expired.store(true, Ordering::Release);
        assert_eq!(registry.sweep(), 1);
        assert!(registry.get(&short).is_none());
        assert!(registry.get(&long).is_some());

        assert!(registry.remove(&long));
        assert!(!registry.remove(&long));
        assert!(registry.is_empty());
    }
}
