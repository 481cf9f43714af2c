//! Combinators that aggregate one-shot signals.
//!
//! [`first_fired`] turns any number of [`Signal`]s into a single future that
//! completes with the identity of whichever signal fires first; [`all_fired`]
//! produces one that completes once every signal has fired. Both are driven
//! purely by the [`Signal::on_fire`] registration contract and are safe
//! against signals firing concurrently from any number of threads.
//!
//! [`ensure_none_fired`] and [`ensure_not_all_fired`] are the synchronous
//! companions: point-in-time checks over a set of signals, with no callbacks
//! and no waiting involved.
//!
//! # Examples
//!
//! ```
//! use tributary::{signal, aggregate};
//!
//! let (source_a, a) = signal();
//! let (_source_b, b) = signal();
//!
//! let first = aggregate::first_fired([a.clone(), b]);
//! assert!(first.try_get().is_none());
//!
//! source_a.fire();
//! assert!(first.block().unwrap().same_source(&a));
//! ```

use std::{
    error::Error,
    fmt,
    future::Future,
    mem,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Condvar, Mutex,
    },
    task::{Context, Poll, Waker},
};

use crate::signal::Signal;

/// Returns a future that completes with the first of `signals` to fire.
///
/// Signals are examined in input order. A signal that has already fired
/// completes the future on the spot, and the remaining signals are not even
/// registered on. Otherwise one callback is registered per signal; whichever
/// runs first completes the future, and every later one is a no-op. This
/// holds no matter how many signals fire concurrently: the future completes
/// exactly once, with exactly one fired signal's identity.
///
/// This operation cannot fail. With no signals at all the future can never
/// complete; waiting on it reports [`Stalled`] rather than blocking forever.
pub fn first_fired<I>(signals: I) -> FirstFired
where
    I: IntoIterator<Item = Signal>,
{
    let cell = Cell::new();
    // Held across registration so that completers racing to zero cannot stall
    // the cell while the scan is still adding more of them.
    let scan = Completer::new(&cell, false);
    for signal in signals {
        if signal.is_fired() {
            cell.complete(signal);
            break;
        }
        let completer = Completer::new(&cell, false);
        let winner = signal.clone();
        signal.on_fire(move || completer.complete(winner));
    }
    drop(scan);
    FirstFired { cell }
}

/// Returns a future that completes once every one of `signals` has fired.
///
/// The signals are partitioned into fired and not-yet-fired in a single pass
/// at call time. If nothing is pending (including the empty input), the
/// future is already complete when this returns. Otherwise each pending
/// signal gets a callback performing one atomic decrement of the pending
/// count; the callback that brings it to zero completes the future. No
/// decrement is lost and the future cannot complete twice, regardless of
/// firing order or concurrency.
///
/// A pending signal firing between the partition pass and its registration is
/// covered by [`Signal::on_fire`] running the callback immediately in that
/// case; no firing can be missed. If any pending signal is abandoned instead,
/// completion has become impossible and waiting reports [`Stalled`].
pub fn all_fired<I>(signals: I) -> AllFired
where
    I: IntoIterator<Item = Signal>,
{
    let pending: Vec<Signal> = signals
        .into_iter()
        .filter(|signal| !signal.is_fired())
        .collect();
    if pending.is_empty() {
        return AllFired {
            cell: Cell::completed(()),
        };
    }

    let cell = Cell::new();
    let remaining = Arc::new(AtomicUsize::new(pending.len()));
    for signal in &pending {
        let completer = Completer::new(&cell, true);
        let remaining = remaining.clone();
        signal.on_fire(move || {
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                completer.complete(());
            } else {
                completer.resign();
            }
        });
    }
    AllFired { cell }
}

/// Fails if any of `signals` has already fired.
///
/// Scans in input order and short-circuits at the first fired signal found.
/// The empty set trivially passes.
pub fn ensure_none_fired(signals: &[Signal]) -> Result<(), Fired> {
    for signal in signals {
        if signal.is_fired() {
            return Err(Fired { _priv: () });
        }
    }
    Ok(())
}

/// Fails if *every* one of `signals` has already fired.
///
/// The empty set passes: with nothing to observe there is nothing to report.
/// (Note the contrast with [`all_fired`], whose future treats the empty set
/// as already complete.)
pub fn ensure_not_all_fired(signals: &[Signal]) -> Result<(), Drained> {
    let fired = signals.iter().filter(|signal| signal.is_fired()).count();
    if !signals.is_empty() && fired == signals.len() {
        return Err(Drained { _priv: () });
    }
    Ok(())
}

/// A future completing with the first signal to fire.
///
/// Created by [`first_fired`]. Cloning yields another handle onto the same
/// result; any number of readers can await or block on it concurrently.
#[derive(Clone)]
pub struct FirstFired {
    cell: Arc<Cell<Signal>>,
}

impl FirstFired {
    /// Returns the winning signal, if one has fired yet.
    pub fn try_get(&self) -> Option<Signal> {
        self.cell.try_get()
    }

    /// Returns whether the future has completed.
    pub fn is_complete(&self) -> bool {
        self.cell.is_complete()
    }

    /// Blocks the calling thread until a signal fires, and returns it.
    ///
    /// Returns a [`Stalled`] error if no signal can fire anymore (every
    /// observed signal was abandoned, or there were none to begin with).
    pub fn block(&self) -> Result<Signal, Stalled> {
        self.cell.block()
    }

    /// Asynchronously waits until a signal fires, and returns it.
    ///
    /// The async twin of [`FirstFired::block`].
    pub async fn wait(&self) -> Result<Signal, Stalled> {
        WaitCell(&self.cell).await
    }
}

/// A future completing once every observed signal has fired.
///
/// Created by [`all_fired`]. Cloning yields another handle onto the same
/// result; any number of readers can await or block on it concurrently.
#[derive(Clone)]
pub struct AllFired {
    cell: Arc<Cell<()>>,
}

impl AllFired {
    /// Returns whether every observed signal has fired.
    pub fn is_complete(&self) -> bool {
        self.cell.is_complete()
    }

    /// Blocks the calling thread until every observed signal has fired.
    ///
    /// Returns a [`Stalled`] error if completion has become impossible
    /// because one of the observed signals was abandoned.
    pub fn block(&self) -> Result<(), Stalled> {
        self.cell.block()
    }

    /// Asynchronously waits until every observed signal has fired.
    ///
    /// The async twin of [`AllFired::block`].
    pub async fn wait(&self) -> Result<(), Stalled> {
        WaitCell(&self.cell).await
    }
}

/// A single-assignment result cell: written at most once, readable by any
/// number of concurrent waiters, both blocking and async.
struct Cell<T> {
    state: Mutex<CellState<T>>,
    condvar: Condvar,
    /// Number of live [`Completer`]s; when it reaches zero with the cell
    /// still pending, nothing can complete it anymore.
    writers: AtomicUsize,
}

enum CellState<T> {
    Pending { wakers: Vec<Waker> },
    Complete(T),
    Stalled,
}

impl<T> Cell<T> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CellState::Pending { wakers: Vec::new() }),
            condvar: Condvar::new(),
            writers: AtomicUsize::new(0),
        })
    }

    fn completed(value: T) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CellState::Complete(value)),
            condvar: Condvar::new(),
            writers: AtomicUsize::new(0),
        })
    }

    /// Writes the result. The first write wins; later writes are dropped.
    fn complete(&self, value: T) {
        let mut state = self.state.lock().unwrap();
        if let CellState::Pending { wakers } = &mut *state {
            let wakers = mem::take(wakers);
            *state = CellState::Complete(value);
            self.condvar.notify_all();
            drop(state);
            wakers.into_iter().for_each(Waker::wake);
        }
    }

    /// Marks the cell as impossible to complete. No effect once complete.
    fn stall(&self) {
        let mut state = self.state.lock().unwrap();
        if let CellState::Pending { wakers } = &mut *state {
            let wakers = mem::take(wakers);
            *state = CellState::Stalled;
            self.condvar.notify_all();
            drop(state);
            wakers.into_iter().for_each(Waker::wake);
        }
    }

    fn is_complete(&self) -> bool {
        matches!(*self.state.lock().unwrap(), CellState::Complete(_))
    }
}

impl<T: Clone> Cell<T> {
    fn try_get(&self) -> Option<T> {
        match &*self.state.lock().unwrap() {
            CellState::Complete(value) => Some(value.clone()),
            CellState::Pending { .. } | CellState::Stalled => None,
        }
    }

    fn block(&self) -> Result<T, Stalled> {
        let mut state = self.state.lock().unwrap();
        loop {
            match &*state {
                CellState::Complete(value) => return Ok(value.clone()),
                CellState::Stalled => return Err(Stalled { _priv: () }),
                CellState::Pending { .. } => {}
            }
            state = self.condvar.wait(state).unwrap();
        }
    }

    fn poll_wait(&self, cx: &mut Context<'_>) -> Poll<Result<T, Stalled>> {
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            CellState::Complete(value) => Poll::Ready(Ok(value.clone())),
            CellState::Stalled => Poll::Ready(Err(Stalled { _priv: () })),
            CellState::Pending { wakers } => {
                wakers.push(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

struct WaitCell<'a, T>(&'a Arc<Cell<T>>);

impl<T: Clone> Future for WaitCell<'_, T> {
    type Output = Result<T, Stalled>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.poll_wait(cx)
    }
}

/// A write capability for a [`Cell`], carried inside registered callbacks.
///
/// Tracks liveness so that a cell whose last possible writer is gone stalls
/// instead of leaving readers waiting forever. A completer dropped without
/// [`Completer::complete`] or [`Completer::resign`] having run means its
/// callback was discarded unrun (the signal was abandoned); with
/// `stall_on_abandon` that alone stalls the cell.
struct Completer<T> {
    cell: Arc<Cell<T>>,
    ran: bool,
    stall_on_abandon: bool,
}

impl<T> Completer<T> {
    fn new(cell: &Arc<Cell<T>>, stall_on_abandon: bool) -> Self {
        cell.writers.fetch_add(1, Ordering::Relaxed);
        Self {
            cell: cell.clone(),
            ran: false,
            stall_on_abandon,
        }
    }

    fn complete(mut self, value: T) {
        self.ran = true;
        self.cell.complete(value);
    }

    /// Declares that the holder ran but left completion to another writer.
    fn resign(mut self) {
        self.ran = true;
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if !self.ran && self.stall_on_abandon {
            self.cell.stall();
        }
        if self.cell.writers.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Last writer gone. If the cell is still pending, it stays that
            // way forever; stall() is a no-op on a completed cell.
            self.cell.stall();
        }
    }
}

/// An error returned by [`ensure_none_fired`] when a signal in the set has
/// already fired.
#[derive(Debug, Clone)]
pub struct Fired {
    _priv: (),
}

impl fmt::Display for Fired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a signal has already fired")
    }
}

impl Error for Fired {}

/// An error returned by [`ensure_not_all_fired`] when every signal in a
/// non-empty set has already fired.
#[derive(Debug, Clone)]
pub struct Drained {
    _priv: (),
}

impl fmt::Display for Drained {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("every signal has already fired")
    }
}

impl Error for Drained {}

/// An error returned when waiting on a [`FirstFired`] or [`AllFired`] future
/// that can no longer complete, because the signals it would need have been
/// abandoned (or it was built from no signals at all).
#[derive(Debug, Clone)]
pub struct Stalled {
    _priv: (),
}

impl fmt::Display for Stalled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("the future can no longer complete")
    }
}

impl Error for Stalled {}
