//! Request-scoped, immutable key/value context.
//!
//! A [`Context`] is a handle to the tip of a persistent, singly-linked chain.
//! Every [`Context::with_value`] call allocates one node pointing at its
//! parent and returns a new handle; nothing that already exists is touched.
//! Lookups walk from the tip toward the root, so the most recent binding for
//! a key shadows older ones.
//!
//! ```text
//! background ← method=GET ← path=/users ← path=/users/42
//!                                              ↑ ctx.value(&PATH) == "/users/42"
//! ```
//!
//! Handles are `Arc`-backed: cloning one is one atomic increment, and the
//! same handle can be read from any number of tasks.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

// ── Key ──────────────────────────────────────────────────────────────────────

/// A typed context key.
///
/// Two keys are the same key when both the name and the value type match.
/// Declare keys as constants next to the code that owns them:
///
/// ```rust
/// use tsu_kit::{Context, Key};
///
/// const TRACE_ID: Key<String> = Key::new("trace-id");
///
/// let ctx = Context::background().with_value(&TRACE_ID, "abc".to_owned());
/// assert_eq!(ctx.value(&TRACE_ID).map(String::as_str), Some("abc"));
/// ```
pub struct Key<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Key<T> {
    /// # Panics
    ///
    /// Panics if `name` is empty. An anonymous key is a programming error.
    /// For a key declared as a `const` the check runs during compilation and
    /// an empty name fails the build; a key built with `let` panics when the
    /// line runs.
    ///
    /// ```compile_fail
    /// use tsu_kit::Key;
    ///
    /// const ANONYMOUS: Key<u32> = Key::new("");
    /// let _ = ANONYMOUS.name();
    /// ```
    pub const fn new(name: &'static str) -> Self {
        assert!(!name.is_empty(), "context key name must not be empty");
        Self { name, _value: PhantomData }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn id(&self) -> KeyId {
        KeyId { name: self.name, ty: TypeId::of::<T>() }
    }
}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Key").field(&self.name).finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct KeyId {
    name: &'static str,
    ty: TypeId,
}

// ── Context ──────────────────────────────────────────────────────────────────

/// An immutable, chained request context.
#[derive(Clone, Default)]
pub struct Context {
    node: Option<Arc<Node>>,
}

struct Node {
    key: KeyId,
    value: Box<dyn Any + Send + Sync>,
    parent: Context,
}

impl Context {
    /// The root context. Every lookup on it returns `None`.
    pub fn background() -> Self {
        Self { node: None }
    }

    /// Returns a new context that extends `self` with `key → value`.
    ///
    /// `self` and every other existing handle keep observing exactly what
    /// they observed before the call.
    #[must_use]
    pub fn with_value<T: Send + Sync + 'static>(&self, key: &Key<T>, value: T) -> Context {
        Context {
            node: Some(Arc::new(Node {
                key: key.id(),
                value: Box::new(value),
                parent: self.clone(),
            })),
        }
    }

    /// Returns the nearest value bound to `key`, or `None`.
    pub fn value<T: Send + Sync + 'static>(&self, key: &Key<T>) -> Option<&T> {
        let id = key.id();
        let mut cur = self.node.as_deref();
        while let Some(node) = cur {
            if node.key == id {
                return node.value.downcast_ref::<T>();
            }
            cur = node.parent.node.as_deref();
        }
        None
    }

    /// Number of bindings between this handle and the root.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cur = self.node.as_deref();
        while let Some(node) = cur {
            depth += 1;
            cur = node.parent.node.as_deref();
        }
        depth
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = Vec::new();
        let mut cur = self.node.as_deref();
        while let Some(node) = cur {
            keys.push(node.key.name);
            cur = node.parent.node.as_deref();
        }
        f.debug_struct("Context").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NUM: Key<u32> = Key::new("num");
    const NAME: Key<String> = Key::new("name");

    #[test]
    fn background_is_empty() {
        let ctx = Context::background();
        assert!(ctx.value(&NUM).is_none());
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn extending_leaves_parent_untouched() {
        let parent = Context::background();
        let child = parent.with_value(&NUM, 7);

        assert_eq!(parent.value(&NUM), None);
        assert_eq!(child.value(&NUM), Some(&7));
    }

    #[test]
    fn newest_binding_shadows() {
        let c1 = Context::background().with_value(&NUM, 1);
        let c2 = c1.with_value(&NUM, 2);

        assert_eq!(c2.value(&NUM), Some(&2));
        assert_eq!(c1.value(&NUM), Some(&1));
        assert_eq!(c2.depth(), 2);
    }

    #[test]
    fn lookup_walks_past_other_keys() {
        let ctx = Context::background()
            .with_value(&NAME, "alice".to_owned())
            .with_value(&NUM, 3);

        assert_eq!(ctx.value(&NAME).map(String::as_str), Some("alice"));
    }

    #[test]
    fn same_name_different_type_is_a_different_key() {
        const OTHER: Key<u64> = Key::new("num");
        let ctx = Context::background().with_value(&NUM, 5);

        assert_eq!(ctx.value(&OTHER), None);
    }

    #[test]
    fn siblings_do_not_see_each_other() {
        let root = Context::background().with_value(&NUM, 0);
        let a = root.with_value(&NAME, "a".to_owned());
        let b = root.with_value(&NAME, "b".to_owned());

        assert_eq!(a.value(&NAME).map(String::as_str), Some("a"));
        assert_eq!(b.value(&NAME).map(String::as_str), Some("b"));
        assert_eq!(a.value(&NUM), b.value(&NUM));
    }

    #[test]
    fn handles_cross_threads() {
        let ctx = Context::background().with_value(&NUM, 9);
        let handle = std::thread::spawn({
            let ctx = ctx.clone();
            move || ctx.value(&NUM).copied()
        });
        assert_eq!(handle.join().unwrap(), Some(9));
    }

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn empty_runtime_key_name_panics() {
        let _ = Key::<u32>::new("");
    }
}
