//! Bounded concurrent fan-out that tolerates failing units

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::domain::evaluation::CancellationFlag;

/// How one fanned-out unit ended
#[derive(Debug)]
pub enum UnitResult<R> {
    Done(R),
    /// The unit's task panicked or was aborted
    Crashed(String),
    /// Never dispatched because cancellation was observed first
    Skipped,
}

/// Run `task` once per input with at most `width` units in flight.
///
/// Results come back in input order. A crashing unit never affects its siblings.
/// Cancellation is checked before each dispatch, including after waiting for a slot;
/// units already running finish normally.
pub async fn fan_out<I, R, F, Fut>(
    inputs: Vec<I>,
    width: usize,
    cancel: &CancellationFlag,
    task: F,
) -> Vec<UnitResult<R>>
where
    I: Send + 'static,
    R: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(width.max(1)));
    let mut handles: Vec<Option<JoinHandle<R>>> = Vec::with_capacity(inputs.len());

    for input in inputs {
        if cancel.is_cancelled() {
            handles.push(None);
            continue;
        }

        let Ok(permit) = permits.clone().acquire_owned().await else {
            handles.push(None);
            continue;
        };

        if cancel.is_cancelled() {
            handles.push(None);
            continue;
        }

        let unit = task(input);
        handles.push(Some(tokio::spawn(async move {
            let _permit = permit;
            unit.await
        })));
    }

    join_all(handles.into_iter().map(|handle| async move {
        match handle {
            Some(handle) => match handle.await {
                Ok(result) => UnitResult::Done(result),
                Err(e) => UnitResult::Crashed(e.to_string()),
            },
            None => UnitResult::Skipped,
        }
    }))
    .await
}
