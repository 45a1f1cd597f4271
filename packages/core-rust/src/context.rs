//! Broadcast contexts propagated to the server in request headers.
//!
//! Every execution context owns an independent [`ContextStack`]. Synchronous
//! code uses a thread-local stack and each spawned tokio task gets its own.
//! Async code can also wrap a future with [`scope`] or [`isolated`] to give
//! it a task-local stack that follows it across `.await` points and worker
//! threads. A scoped stack takes precedence over the task's, which takes
//! precedence over the thread's.
//!
//! Entries are pushed with [`enter_context`] and popped when the returned
//! [`ContextScope`] guard is dropped, so the stack is restored on every exit
//! path, including `?` returns and panics.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use parking_lot::Mutex;
use tokio::task;

use crate::messages::RequestContext;

/// Key under which [`authorize`] publishes its token.
pub const AUTH_TOKEN_KEY: &str = "com.adazza.common.finagle.AuthToken";

thread_local! {
    static THREAD_STACK: RefCell<ContextStack> = RefCell::new(ContextStack::new());
}

tokio::task_local! {
    static TASK_STACK: RefCell<ContextStack>;
}

/// Stacks of spawned tokio tasks running outside any [`scope`]. An entry
/// lives while its stack is non-empty.
static SPAWNED_STACKS: LazyLock<Mutex<HashMap<task::Id, ContextStack>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// An immutable key/value pair broadcast with every call made while it is
/// on the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    key: String,
    value: Vec<u8>,
}

impl Context {
    /// String values are stored as their UTF-8 bytes.
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Wire form of this context.
    #[must_use]
    pub fn to_wire(&self) -> RequestContext {
        RequestContext::new(self.key.as_bytes(), self.value.clone())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    id: u64,
    context: Context,
}

/// Ordered contexts of one execution context, bottom first.
#[derive(Debug, Clone, Default)]
pub struct ContextStack {
    entries: Vec<Entry>,
}

// Entry ids are bookkeeping; two stacks are equal when their contexts are.
impl PartialEq for ContextStack {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for ContextStack {}

impl ContextStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Context> {
        self.entries.iter().map(|entry| &entry.context)
    }

    /// Wire forms of all entries, bottom to top.
    #[must_use]
    pub fn to_wire(&self) -> Vec<RequestContext> {
        self.iter().map(Context::to_wire).collect()
    }

    fn push(&mut self, context: Context) -> u64 {
        let id = NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed);
        self.entries.push(Entry { id, context });
        id
    }

    /// Removes the entry pushed as `id`, wherever it sits.
    fn remove(&mut self, id: u64) -> bool {
        match self.entries.iter().rposition(|entry| entry.id == id) {
            Some(position) => {
                self.entries.remove(position);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackOwner {
    /// Task-local stack installed by [`scope`] or [`isolated`].
    Scoped,
    Spawned(task::Id),
    Thread,
}

fn active_owner() -> StackOwner {
    if TASK_STACK.try_with(|_| ()).is_ok() {
        StackOwner::Scoped
    } else if let Some(id) = task::try_id() {
        StackOwner::Spawned(id)
    } else {
        StackOwner::Thread
    }
}

/// Runs `f` against the owner's stack. `None` when that stack is gone
/// (task scope finished or thread-local already destroyed).
fn with_stack<R>(owner: StackOwner, f: impl FnOnce(&mut ContextStack) -> R) -> Option<R> {
    match owner {
        StackOwner::Scoped => TASK_STACK.try_with(|stack| f(&mut stack.borrow_mut())).ok(),
        StackOwner::Spawned(id) => {
            let mut stacks = SPAWNED_STACKS.lock();
            let stack = stacks.entry(id).or_default();
            let result = f(stack);
            if stack.is_empty() {
                stacks.remove(&id);
            }
            Some(result)
        }
        StackOwner::Thread => THREAD_STACK.try_with(|stack| f(&mut stack.borrow_mut())).ok(),
    }
}

/// Guard returned by [`enter_context`]; dropping it removes exactly the
/// entry it pushed, leaving entries of other live guards in place.
///
/// The guard is `!Send`: it must be released in the execution context that
/// created it.
#[derive(Debug)]
#[must_use = "the context is popped as soon as the guard is dropped"]
pub struct ContextScope {
    owner: StackOwner,
    entry: u64,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        let entry = self.entry;
        let removed = with_stack(self.owner, |stack| stack.remove(entry));
        if removed == Some(false) {
            tracing::warn!(entry, "context scope entry already gone");
        }
    }
}

/// Pushes `key`/`value` onto the current execution context's stack for the
/// lifetime of the returned guard.
///
/// Inside a spawned tokio task the stack belongs to that task. Futures
/// multiplexed within one task (`join!`, `select!`) share it; wrap each in
/// [`scope`] to give it a stack of its own.
pub fn enter_context(key: impl Into<String>, value: impl Into<Vec<u8>>) -> ContextScope {
    let owner = active_owner();
    let context = Context::new(key, value);
    let entry = with_stack(owner, |stack| stack.push(context)).unwrap_or(0);
    tracing::trace!(?owner, entry, "entered broadcast context");
    ContextScope {
        owner,
        entry,
        _not_send: PhantomData,
    }
}

/// Publishes an auth token for the lifetime of the returned guard.
pub fn authorize(token: impl Into<Vec<u8>>) -> ContextScope {
    enter_context(AUTH_TOKEN_KEY, token)
}

/// Snapshot of the active stack.
#[must_use]
pub fn current_stack() -> ContextStack {
    with_stack(active_owner(), |stack| stack.clone()).unwrap_or_default()
}

/// Snapshot of the active stack's entries, bottom first.
#[must_use]
pub fn current_contexts() -> Vec<Context> {
    current_stack().iter().cloned().collect()
}

/// Depth of the active stack.
#[must_use]
pub fn depth() -> usize {
    with_stack(active_owner(), |stack| stack.depth()).unwrap_or(0)
}

/// Runs `future` with a task-local stack holding the caller's entries plus
/// `key`/`value`. The caller's stack is untouched.
pub async fn scope<F: Future>(
    key: impl Into<String>,
    value: impl Into<Vec<u8>>,
    future: F,
) -> F::Output {
    let mut stack = current_stack();
    stack.push(Context::new(key, value));
    TASK_STACK.scope(RefCell::new(stack), future).await
}

/// Async counterpart of [`authorize`].
pub async fn authorized<F: Future>(token: impl Into<Vec<u8>>, future: F) -> F::Output {
    scope(AUTH_TOKEN_KEY, token, future).await
}

/// Runs `future` with an empty task-local stack, detached from whatever the
/// polling thread or enclosing task has entered.
pub async fn isolated<F: Future>(future: F) -> F::Output {
    TASK_STACK.scope(RefCell::new(ContextStack::new()), future).await
}
