//! Long-lived reactive reads over the cache.
//!
//! A [`Subscription`] is the receiving end of a channel fed by a producer task.
//! Values arrive whenever the producer has something new; the subscription
//! ends when the producer finishes. Dropping it stops the producer.

use color_eyre::Result;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::worker::Worker;

/// Buffered values per subscription before the producer waits
const CHANNEL_CAPACITY: usize = 16;

pub struct Subscription<T> {
  rx: mpsc::Receiver<T>,
  producer: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Subscription<T> {
  /// Spawn `producer` on the worker, handing it the sending half.
  pub fn spawn<F, Fut>(worker: &Worker, producer: F) -> Self
  where
    F: FnOnce(mpsc::Sender<T>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let handle = worker.spawn(producer(tx));

    Self {
      rx,
      producer: Some(handle),
    }
  }

  /// A finished subscription that yields `values` and then ends.
  pub fn from_values(values: impl IntoIterator<Item = T>) -> Self {
    let values: Vec<T> = values.into_iter().collect();
    let (tx, rx) = mpsc::channel(values.len().max(1));
    for value in values {
      // Capacity covers every value, so this cannot fail.
      let _ = tx.try_send(value);
    }

    Self { rx, producer: None }
  }

  /// A subscription that ends without yielding anything.
  pub fn empty() -> Self {
    Self::from_values(Vec::new())
  }

  /// Wait for the next value. `None` once the producer is done.
  pub async fn next(&mut self) -> Option<T> {
    self.rx.recv().await
  }

  /// Take the first value and detach.
  pub async fn first(mut self) -> Option<T> {
    self.rx.recv().await
  }
}

impl<T: Clone + PartialEq + Send + 'static> Subscription<Result<T>> {
  /// Re-run `load` on the worker each time `changes` ticks, emitting the
  /// result when it differs from the previous emission.
  ///
  /// The first result is always emitted. A failed load is emitted as the
  /// final item.
  pub fn watch<F>(worker: &Worker, mut changes: watch::Receiver<u64>, load: F) -> Self
  where
    F: Fn() -> Result<T> + Send + Sync + 'static,
  {
    let load = Arc::new(load);
    let runner = worker.clone();

    Self::spawn(worker, move |tx| async move {
      let mut last: Option<T> = None;
      changes.borrow_and_update();

      loop {
        let load = Arc::clone(&load);
        let value = match runner.run_blocking(move || load()).await {
          Ok(value) => value,
          Err(e) => {
            tracing::warn!(error = %e, "cache query failed, closing subscription");
            let _ = tx.send(Err(e)).await;
            break;
          }
        };

        if last.as_ref() != Some(&value) {
          if tx.send(Ok(value.clone())).await.is_err() {
            break;
          }
          last = Some(value);
        }

        tokio::select! {
          changed = changes.changed() => {
            if changed.is_err() {
              break;
            }
          }
          _ = tx.closed() => break,
        }
      }
    })
  }
}

impl<T> Stream for Subscription<T> {
  type Item = T;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
    self.rx.poll_recv(cx)
  }
}

impl<T> Drop for Subscription<T> {
  fn drop(&mut self) {
    if let Some(producer) = self.producer.take() {
      producer.abort();
    }
  }
}

impl<T> std::fmt::Debug for Subscription<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("live", &self.producer.as_ref().is_some_and(|p| !p.is_finished()))
      .finish_non_exhaustive()
  }
}
