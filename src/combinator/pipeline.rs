//! Channel pipeline stages: producers, filters, transforms.
//!
//! Every stage is an ordinary child task of the caller's scope, wired to
//! the next stage by a bounded channel. A stage's output closes when the
//! stage finishes (its sender drops), so closure ripples down the chain;
//! cancelling the owning scope tears the whole chain down because every
//! stage is a descendant.

use crate::channel::{channel, Receiver, Sender};
use crate::runtime::ScopeHandle;
use std::future::Future;

/// Spawns a producer task and returns the receiving end of its output.
///
/// `body` gets the sender and runs as a child of `scope`. When the body
/// returns (or is cancelled and dropped) the sender drops, consumers drain
/// whatever is buffered, then see the channel closed.
pub fn produce<T, F, Fut>(scope: &ScopeHandle, capacity: usize, body: F) -> Receiver<T>
where
    T: Send + 'static,
    F: FnOnce(Sender<T>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = channel(capacity);
    scope.spawn_child(body(tx));
    rx
}

/// Spawns a stage that forwards the values matching `predicate`.
///
/// The stage runs until upstream closes or downstream hangs up.
pub fn filter_stage<T, P>(
    scope: &ScopeHandle,
    input: Receiver<T>,
    capacity: usize,
    mut predicate: P,
) -> Receiver<T>
where
    T: Send + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
{
    produce(scope, capacity, move |tx| async move {
        while let Ok(value) = input.recv().await {
            if predicate(&value) && tx.send(value).await.is_err() {
                break;
            }
        }
    })
}

/// Spawns a stage that applies `transform` to every value.
pub fn map_stage<T, U, F>(
    scope: &ScopeHandle,
    input: Receiver<T>,
    capacity: usize,
    mut transform: F,
) -> Receiver<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnMut(T) -> U + Send + 'static,
{
    produce(scope, capacity, move |tx| async move {
        while let Ok(value) = input.recv().await {
            if tx.send(transform(value)).await.is_err() {
                break;
            }
        }
    })
}
