//! Background execution context for blocking store work.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Handle to the runtime that runs cache work off the caller's context.
///
/// Blocking calls go to the runtime's blocking pool; producer tasks for
/// subscriptions are spawned on it. Results come back to whoever awaited.
#[derive(Clone, Debug)]
pub struct Worker {
  handle: Handle,
}

impl Worker {
  pub fn new(handle: Handle) -> Self {
    Self { handle }
  }

  /// Use the runtime the caller is running on.
  ///
  /// Panics when called outside a tokio runtime.
  pub fn current() -> Self {
    Self::new(Handle::current())
  }

  /// Run a blocking closure on the worker and wait for its result.
  pub async fn run_blocking<F, T>(&self, f: F) -> Result<T>
  where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self
      .handle
      .spawn_blocking(f)
      .await
      .map_err(|e| eyre!("Worker job failed: {}", e))?
  }

  pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
  where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
  {
    self.handle.spawn(future)
  }
}
