//! The ambient "current repository" context.
//!
//! Instead of a process-global mutable registry, the ambient context is a
//! thread-local stack of repository handles with RAII restoration:
//! [`Repository::enter`] pushes and returns a [`ContextGuard`] whose drop
//! pops, so the prior context is restored on every exit path, including
//! unwinding.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::repository::Repository;

thread_local! {
    static CONTEXT: RefCell<Vec<Arc<Repository>>> = const { RefCell::new(Vec::new()) };
}

/// Scoped handle on the ambient repository context. Dropping it restores the
/// previously current repository.
///
/// Not `Send`: the guard must be dropped on the thread that created it.
#[derive(Debug)]
pub struct ContextGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CONTEXT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl Repository {
    /// Makes this repository the ambient current one for the guard's
    /// lifetime.
    pub fn enter(&self) -> ContextGuard {
        CONTEXT.with(|stack| stack.borrow_mut().push(self.handle()));
        ContextGuard {
            _not_send: PhantomData,
        }
    }

    /// The ambient current repository of this thread, if any.
    pub fn current() -> Option<Arc<Repository>> {
        CONTEXT.with(|stack| stack.borrow().last().cloned())
    }
}

/// Runs a closure with the given repository as the ambient current one,
/// restoring the prior context afterwards.
pub fn with_repository<R>(
    repository: &Arc<Repository>,
    f: impl FnOnce(&Arc<Repository>) -> R,
) -> R {
    let _guard = repository.enter();
    f(repository)
}
