//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::time::Duration;

use tokio::task;
use tracing::Instrument;

/// Handle of a task spawned with [`Task::spawn`].
///
/// Dropping the handle aborts the task.
#[derive(Debug)]
pub struct Task<T> {
    join_handle: task::JoinHandle<T>,
}

/// Handle of a one-shot timer created with [`TimeoutTask::new`].
///
/// Dropping the handle cancels the timer if it hasn't fired yet.
#[derive(Debug)]
pub struct TimeoutTask {
    _task: Task<()>,
}

// ===== impl Task =====

impl<T> Task<T> {
    pub fn spawn<Fut>(future: Fut) -> Task<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn(future),
        }
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

// ===== impl TimeoutTask =====

impl TimeoutTask {
    /// Calls `cb` once `timeout` expires.
    ///
    /// The callback runs within the span of the caller.
    pub fn new<F, Fut>(timeout: Duration, cb: F) -> TimeoutTask
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let task = Task::spawn(
            async move {
                tokio::time::sleep(timeout).await;
                (cb)().await;
            }
            .in_current_span(),
        );

        TimeoutTask { _task: task }
    }
}
