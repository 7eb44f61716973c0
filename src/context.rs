//! Cooperative cancellation for engine operations.
//!
//! Every engine call takes a [Context]. A context can be cancelled by whoever
//! holds its [CancelHandle], can carry a deadline, and passes both on to any
//! contexts derived from it: cancelling a parent cancels all of its children.
//! Nothing is interrupted by force. Long-running work (fetching a proof)
//! races the context and bails out when it fires.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::{sync::watch, time::Instant};

#[derive(Debug)]
struct CancelState {
    tx: watch::Sender<bool>,
    children: Mutex<Vec<Weak<CancelState>>>,
}

impl CancelState {
    fn new() -> Arc<Self> {
        let (tx, _rx) = watch::channel(false);
        Arc::new(Self {
            tx,
            children: Mutex::new(Vec::new()),
        })
    }

    fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn cancel(&self) {
        // set our flag before touching children so a child being attached
        // concurrently either sees the flag or ends up in the list we drain.
        self.tx.send_replace(true);
        let children = match self.children.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }

    fn attach(&self, child: &Arc<CancelState>) {
        let mut guard = match self.children.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.is_cancelled() {
            drop(guard);
            child.cancel();
            return;
        }
        guard.retain(|weak| weak.strong_count() > 0);
        guard.push(Arc::downgrade(child));
    }
}

/// Cancels the [Context] it was created with (and everything derived from
/// that context).
#[derive(Debug, Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.state.cancel();
    }
}

/// Carries cancellation and an optional deadline into engine operations.
#[derive(Debug, Clone, Default)]
pub struct Context {
    state: Option<Arc<CancelState>>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context that can be cancelled with the returned handle.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let state = CancelState::new();
        if let Some(parent) = self.state.as_ref() {
            parent.attach(&state);
        }
        let ctx = Self {
            state: Some(state.clone()),
            deadline: self.deadline,
        };
        (ctx, CancelHandle { state })
    }

    /// Derive a context that expires after `timeout` (or at the parent's
    /// deadline, whichever comes first).
    pub fn with_timeout(&self, timeout: Duration) -> (Self, CancelHandle) {
        let (mut ctx, handle) = self.with_cancel();
        let deadline = Instant::now() + timeout;
        ctx.deadline = Some(match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        });
        (ctx, handle)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why this context is done, if it is.
    pub fn err(&self) -> Option<Error> {
        if self.state.as_ref().map(|s| s.is_cancelled()).unwrap_or(false) {
            return Some(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.err().is_some()
    }

    /// Returns an error if the context is done.
    pub fn check(&self) -> Result<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Resolves once the context is cancelled or hits its deadline, returning
    /// the reason. Never resolves for a background context.
    pub async fn done(&self) -> Error {
        let cancelled = async {
            match self.state.as_ref() {
                Some(state) => {
                    let mut rx = state.tx.subscribe();
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = cancelled => Error::Cancelled,
            _ = expired => Error::DeadlineExceeded,
        }
    }

    /// Run a future to completion unless the context finishes first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            res = fut => res,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_runs() {
        let ctx = Context::background();
        assert!(!ctx.is_cancelled());
        assert_eq!(ctx.check(), Ok(()));
        let res = ctx.run(async { Ok(42) }).await;
        assert_eq!(res, Ok(42));
    }

    #[tokio::test]
    async fn cancel_propagates_to_children() {
        let (parent, handle) = Context::background().with_cancel();
        let (child, _child_handle) = parent.with_cancel();
        let (grandchild, _) = child.with_timeout(Duration::from_secs(60));
        assert!(!grandchild.is_cancelled());

        handle.cancel();
        assert_eq!(parent.err(), Some(Error::Cancelled));
        assert_eq!(child.err(), Some(Error::Cancelled));
        assert_eq!(grandchild.err(), Some(Error::Cancelled));

        // children of a cancelled context start out cancelled
        let (late, _) = parent.with_cancel();
        assert_eq!(late.err(), Some(Error::Cancelled));
    }

    #[tokio::test]
    async fn cancelling_child_leaves_parent() {
        let (parent, _handle) = Context::background().with_cancel();
        let (child, child_handle) = parent.with_cancel();
        child_handle.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let (ctx, handle) = Context::background().with_cancel();
        let runner = ctx.clone();
        let task = tokio::spawn(async move {
            runner
                .run(async {
                    std::future::pending::<()>().await;
                    Ok(())
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        assert_eq!(task.await.unwrap(), Err(Error::Cancelled));
        // already cancelled means we don't even start
        assert_eq!(ctx.run(async { Ok(1) }).await, Err(Error::Cancelled));
    }

    #[tokio::test]
    async fn run_stops_on_deadline() {
        let (ctx, _handle) = Context::background().with_timeout(Duration::from_millis(10));
        let res = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await;
        assert_eq!(res, Err(Error::DeadlineExceeded));
        assert_eq!(ctx.err(), Some(Error::DeadlineExceeded));

        // the shorter deadline wins
        let (parent, _) = Context::background().with_timeout(Duration::from_millis(5));
        let (child, _) = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
