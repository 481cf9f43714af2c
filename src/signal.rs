//! One-shot signals.
//!
//! [`signal`] creates a connected pair of [`SignalSource`] and [`Signal`]. The
//! [`SignalSource`] is held by whoever decides that the event has happened and
//! fires it (at most once, observably); any number of cloned [`Signal`] handles
//! can check the state, register one-shot callbacks, or wait for the firing,
//! from any thread, with or without an async runtime.
//!
//! A fired signal stays fired. If the [`SignalSource`] is dropped without
//! firing, the signal becomes *abandoned*: registered callbacks are discarded
//! without running, and waiters observe an [`Abandoned`] error instead of
//! blocking forever.
//!
//! The aggregation combinators in [`crate::aggregate`] are built entirely on
//! the [`Signal::is_fired`]/[`Signal::on_fire`] pair.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use tributary::signal;
//!
//! let (source, signal) = signal();
//!
//! let hit = Arc::new(AtomicBool::new(false));
//! let hit2 = hit.clone();
//! signal.on_fire(move || hit2.store(true, Ordering::Relaxed));
//!
//! assert!(!signal.is_fired());
//! source.fire();
//! assert!(signal.is_fired());
//! assert!(hit.load(Ordering::Relaxed));
//! ```

use std::{
    error::Error,
    fmt,
    future::Future,
    mem,
    pin::Pin,
    sync::{Arc, Condvar, Mutex},
    task::{Context, Poll, Waker},
};

type Callback = Box<dyn FnOnce() + Send>;

/// Creates a connected pair of [`SignalSource`] and [`Signal`].
pub fn signal() -> (SignalSource, Signal) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::Pending {
            callbacks: Vec::new(),
            wakers: Vec::new(),
        }),
        condvar: Condvar::new(),
    });
    (
        SignalSource {
            shared: shared.clone(),
        },
        Signal { shared },
    )
}

enum State {
    Pending {
        callbacks: Vec<Callback>,
        wakers: Vec<Waker>,
    },
    Fired,
    Abandoned,
}

struct Shared {
    state: Mutex<State>,
    condvar: Condvar,
}

/// The owning half of a signal, capable of firing it.
///
/// There is exactly one [`SignalSource`] per signal. Dropping it without
/// calling [`SignalSource::fire`] abandons the signal.
pub struct SignalSource {
    shared: Arc<Shared>,
}

impl SignalSource {
    /// Fires the signal.
    ///
    /// The first call wakes every blocked and suspended waiter and runs every
    /// registered callback, in registration order, on the calling thread.
    /// Callbacks run after internal locks are released, so they are free to
    /// use the signal again. Later calls do nothing.
    pub fn fire(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if !matches!(*state, State::Pending { .. }) {
            return;
        }
        let prev = mem::replace(&mut *state, State::Fired);
        self.shared.condvar.notify_all();
        drop(state);

        let State::Pending { callbacks, wakers } = prev else {
            unreachable!()
        };
        wakers.into_iter().for_each(Waker::wake);
        for callback in callbacks {
            callback();
        }
    }

    /// Returns whether [`SignalSource::fire`] has been called.
    pub fn is_fired(&self) -> bool {
        matches!(*self.shared.state.lock().unwrap(), State::Fired)
    }

    /// Creates another [`Signal`] observing this source.
    pub fn signal(&self) -> Signal {
        Signal {
            shared: self.shared.clone(),
        }
    }
}

impl Drop for SignalSource {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        if !matches!(*state, State::Pending { .. }) {
            return;
        }
        let prev = mem::replace(&mut *state, State::Abandoned);
        self.shared.condvar.notify_all();
        drop(state);

        // Wake waiters so they can observe the abandonment. The registered
        // callbacks are dropped without running; their destructors must not be
        // able to deadlock against us, which is why the lock is released first.
        let State::Pending { callbacks, wakers } = prev else {
            unreachable!()
        };
        wakers.into_iter().for_each(Waker::wake);
        drop(callbacks);
    }
}

/// An observer handle to a signal created with [`signal`].
///
/// [`Signal`] is cheap to clone; all clones observe the same underlying
/// signal. Dropping handles never affects the signal's state.
#[derive(Clone)]
pub struct Signal {
    shared: Arc<Shared>,
}

impl Signal {
    /// Returns whether the signal has fired.
    pub fn is_fired(&self) -> bool {
        matches!(*self.shared.state.lock().unwrap(), State::Fired)
    }

    /// Registers a callback to run when the signal fires.
    ///
    /// The callback is invoked *exactly once* if the signal ever fires:
    /// immediately on the calling thread when the signal has already fired,
    /// otherwise later on the firing thread. If the signal is abandoned, the
    /// callback is dropped without being invoked.
    pub fn on_fire<F: FnOnce() + Send + 'static>(&self, callback: F) {
        let run_now = {
            let mut state = self.shared.state.lock().unwrap();
            match &mut *state {
                State::Pending { callbacks, .. } => {
                    callbacks.push(Box::new(callback));
                    return;
                }
                State::Fired => true,
                State::Abandoned => false,
            }
        };
        if run_now {
            callback();
        }
    }

    /// Blocks the calling thread until the signal fires.
    ///
    /// Returns an [`Abandoned`] error if the [`SignalSource`] has been
    /// dropped, or is dropped while blocking, without firing.
    pub fn block(&self) -> Result<(), Abandoned> {
        let mut state = self.shared.state.lock().unwrap();
        loop {
            match *state {
                State::Fired => return Ok(()),
                State::Abandoned => return Err(Abandoned { _priv: () }),
                State::Pending { .. } => state = self.shared.condvar.wait(state).unwrap(),
            }
        }
    }

    /// Asynchronously waits until the signal fires.
    ///
    /// The async twin of [`Signal::block`], usable from any executor.
    pub async fn wait(&self) -> Result<(), Abandoned> {
        struct Waiter<'a>(&'a Signal);

        impl Future for Waiter<'_> {
            type Output = Result<(), Abandoned>;

            fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
                let mut state = self.0.shared.state.lock().unwrap();
                match &mut *state {
                    State::Fired => Poll::Ready(Ok(())),
                    State::Abandoned => Poll::Ready(Err(Abandoned { _priv: () })),
                    State::Pending { wakers, .. } => {
                        wakers.push(cx.waker().clone());
                        Poll::Pending
                    }
                }
            }
        }

        Waiter(self).await
    }

    /// Returns whether `self` and `other` observe the same underlying signal.
    pub fn same_source(&self, other: &Signal) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Returns the number of callbacks currently registered and not yet run.
    ///
    /// Firing or abandoning the signal drains the registration list, so this
    /// returns 0 afterwards.
    pub fn watcher_count(&self) -> usize {
        match &*self.shared.state.lock().unwrap() {
            State::Pending { callbacks, .. } => callbacks.len(),
            State::Fired | State::Abandoned => 0,
        }
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.shared.state.lock().unwrap() {
            State::Pending { .. } => "pending",
            State::Fired => "fired",
            State::Abandoned => "abandoned",
        };
        f.debug_struct("Signal").field("state", &state).finish()
    }
}

/// An error returned by [`Signal::block`] and [`Signal::wait`] indicating that
/// the connected [`SignalSource`] was dropped without firing.
#[derive(Debug, Clone)]
pub struct Abandoned {
    _priv: (),
}

impl fmt::Display for Abandoned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("the signal source was dropped without firing")
    }
}

impl Error for Abandoned {}
