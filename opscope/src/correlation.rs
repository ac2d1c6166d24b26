//! Ambient correlation-identifier propagation.
//!
//! A correlation identifier links every record emitted by one logical
//! request or job. The identifier lives in a "logical execution context
//! cell": a tokio task-local slot when code runs inside a propagated async
//! context, with a thread-local fallback for synchronous callers. Mutation
//! is always context-local, so no cross-context locking exists here.
//!
//! Propagation rules:
//! - A value set before spawning a derived unit of work is visible inside
//!   that unit (wrap the spawned future with [`CorrelationContext::propagate`]).
//! - Mutations inside a child unit never leak back to the parent: each
//!   propagated future gets a fresh cell seeded from the parent's value.
//! - [`CorrelationContext::begin_scope`] follows strict stack discipline:
//!   dropping the guard restores exactly the prior value, including "absent".

use std::cell::RefCell;

use uuid::Uuid;

/// Mutable identifier slot owned by one logical execution context.
#[derive(Debug, Default)]
struct Cell {
    value: RefCell<Option<String>>,
}

impl Cell {
    fn seeded(value: Option<String>) -> Self {
        Self {
            value: RefCell::new(value),
        }
    }
}

tokio::task_local! {
    static TASK_CELL: Cell;
}

thread_local! {
    static THREAD_CELL: Cell = Cell::default();
}

fn with_cell<R>(f: impl FnOnce(&Cell) -> R) -> R {
    // try_with probes whether this task carries a propagated cell; outside
    // any propagated context the thread-local slot is authoritative.
    if TASK_CELL.try_with(|_| ()).is_ok() {
        TASK_CELL.with(f)
    } else {
        THREAD_CELL.with(f)
    }
}

/// Ambient correlation-identifier store with scoped override/restore.
///
/// All methods are associated functions: the store itself is the ambient
/// context, not an object callers thread around.
pub struct CorrelationContext;

impl CorrelationContext {
    /// Get the current identifier, generating and storing one if absent.
    ///
    /// The generated value is stable for the remainder of this logical
    /// execution context until explicitly cleared or overridden.
    #[must_use]
    pub fn current() -> String {
        with_cell(|cell| {
            let mut slot = cell.value.borrow_mut();
            if let Some(id) = slot.as_ref() {
                return id.clone();
            }
            let id = Self::generate();
            *slot = Some(id.clone());
            id
        })
    }

    /// Get the current identifier without any generation side effect.
    #[must_use]
    pub fn get() -> Option<String> {
        with_cell(|cell| cell.value.borrow().clone())
    }

    /// Replace the current identifier.
    pub fn set(id: impl Into<String>) {
        let id = id.into();
        with_cell(|cell| *cell.value.borrow_mut() = Some(id));
    }

    /// Remove the current identifier from this context.
    pub fn clear() {
        with_cell(|cell| *cell.value.borrow_mut() = None);
    }

    /// Begin a scoped override, restoring the prior value on guard drop.
    ///
    /// With `Some(id)` the scope carries that identifier; with `None` a
    /// fresh one is generated for the scope.
    #[must_use]
    pub fn begin_scope(id: Option<String>) -> CorrelationScope {
        let previous = Self::get();
        let id = id.unwrap_or_else(Self::generate);
        Self::set(id);
        CorrelationScope { previous }
    }

    /// Run a future inside a fresh cell seeded from the caller's value.
    ///
    /// Wrap futures handed to `tokio::spawn` with this so the identifier
    /// follows the work; the child's mutations stay in the child.
    pub fn propagate<F>(fut: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        TASK_CELL.scope(Cell::seeded(Self::get()), fut)
    }

    /// Run a future inside a fresh cell seeded with an explicit identifier.
    pub fn scope<F>(id: impl Into<String>, fut: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        TASK_CELL.scope(Cell::seeded(Some(id.into())), fut)
    }

    fn generate() -> String {
        Uuid::new_v4().to_string()
    }
}

/// Guard produced by [`CorrelationContext::begin_scope`].
///
/// Dropping restores exactly the value that was active immediately before
/// the scope began, including "absent".
#[derive(Debug)]
pub struct CorrelationScope {
    previous: Option<String>,
}

impl Drop for CorrelationScope {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(prev) => CorrelationContext::set(prev),
            None => CorrelationContext::clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_generates_once() {
        CorrelationContext::clear();
        assert!(CorrelationContext::get().is_none());

        let first = CorrelationContext::current();
        let second = CorrelationContext::current();
        assert_eq!(first, second);

        CorrelationContext::clear();
        assert!(CorrelationContext::get().is_none());
    }

    #[test]
    fn test_get_has_no_side_effect() {
        CorrelationContext::clear();
        assert!(CorrelationContext::get().is_none());
        assert!(CorrelationContext::get().is_none());
    }

    #[test]
    fn test_scope_restores_previous_value() {
        CorrelationContext::clear();
        CorrelationContext::set("outer");

        {
            let _scope = CorrelationContext::begin_scope(Some("inner".to_string()));
            assert_eq!(CorrelationContext::get().as_deref(), Some("inner"));

            {
                let _nested = CorrelationContext::begin_scope(None);
                let nested = CorrelationContext::get();
                assert!(nested.is_some());
                assert_ne!(nested.as_deref(), Some("inner"));
            }

            assert_eq!(CorrelationContext::get().as_deref(), Some("inner"));
        }

        assert_eq!(CorrelationContext::get().as_deref(), Some("outer"));
        CorrelationContext::clear();
    }

    #[test]
    fn test_scope_restores_absent() {
        CorrelationContext::clear();
        {
            let _scope = CorrelationContext::begin_scope(Some("temp".to_string()));
            assert_eq!(CorrelationContext::get().as_deref(), Some("temp"));
        }
        assert!(CorrelationContext::get().is_none());
    }

    #[tokio::test]
    async fn test_value_visible_in_spawned_task() {
        CorrelationContext::scope("req-42", async {
            assert_eq!(CorrelationContext::get().as_deref(), Some("req-42"));

            let handle = tokio::spawn(CorrelationContext::propagate(async {
                CorrelationContext::get()
            }));
            let seen = handle.await.unwrap();
            assert_eq!(seen.as_deref(), Some("req-42"));
        })
        .await;
    }

    #[tokio::test]
    async fn test_child_mutations_do_not_leak() {
        CorrelationContext::scope("parent", async {
            let handle = tokio::spawn(CorrelationContext::propagate(async {
                CorrelationContext::set("child-override");
                assert_eq!(
                    CorrelationContext::get().as_deref(),
                    Some("child-override")
                );
            }));
            handle.await.unwrap();

            assert_eq!(CorrelationContext::get().as_deref(), Some("parent"));
        })
        .await;
    }

    #[tokio::test]
    async fn test_survives_await_points() {
        CorrelationContext::scope("span-1", async {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            assert_eq!(CorrelationContext::get().as_deref(), Some("span-1"));

            {
                let _scope = CorrelationContext::begin_scope(Some("span-2".to_string()));
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                assert_eq!(CorrelationContext::get().as_deref(), Some("span-2"));
            }

            assert_eq!(CorrelationContext::get().as_deref(), Some("span-1"));
        })
        .await;
    }
}
