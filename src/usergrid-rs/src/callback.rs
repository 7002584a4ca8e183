//! Delivery of completion and progress callbacks.
//!
//! Network work runs on tokio tasks; user callbacks never run there. Each
//! client is built with a [`CallbackContext`] that decides where they run:
//! a dedicated thread (the default), a caller-driven [`CallbackPump`], or any
//! custom executor via [`CallbackContext::from_fn`].

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const DEFAULT_CALLBACK_THREAD: &str = "usergrid-callbacks";

pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone)]
pub struct CallbackContext {
    dispatch: Arc<dyn Fn(Job) + Send + Sync>,
}

impl CallbackContext {
    /// Run callbacks through `dispatch`
    pub fn from_fn<F>(dispatch: F) -> Self
    where
        F: Fn(Job) + Send + Sync + 'static,
    {
        Self {
            dispatch: Arc::new(dispatch),
        }
    }

    /// Run callbacks on a named thread that lives as long as the context
    pub fn dedicated_thread(name: &str) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
                        warn!("Callback panicked; continuing with the next one");
                    }
                }
                debug!("Callback thread exiting");
            })?;

        Ok(Self::from_fn(move |job| {
            if tx.send(job).is_err() {
                warn!("Callback thread has stopped; dropping callback");
            }
        }))
    }

    /// Queue callbacks until the returned pump runs them
    pub fn channel() -> (Self, CallbackPump) {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let context = Self::from_fn(move |job| {
            if tx.send(job).is_err() {
                warn!("Callback pump dropped; dropping callback");
            }
        });
        (context, CallbackPump { rx })
    }

    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        (self.dispatch)(Box::new(job));
    }
}

impl fmt::Debug for CallbackContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackContext").finish_non_exhaustive()
    }
}

/// Receiving end of [`CallbackContext::channel`]
pub struct CallbackPump {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl CallbackPump {
    /// Run every queued callback without waiting. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait for the next callback and run it. `false` once every sender is gone.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }
}
