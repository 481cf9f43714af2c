//! Sources of asynchronous element sequences.
//!
//! A [`Source`] is this crate's pull-based asynchronous iterator: each
//! [`Source::poll_next`] call attempts to produce the next element,
//! suspending the caller (via the usual [`Waker`] protocol) while one is not
//! ready, and each source owns resources that are released by a single
//! [`Source::close`] call. The [`Chain`][crate::chain::Chain] combinator
//! consumes sources exclusively through this trait.
//!
//! Two stock implementations are provided: [`items`] turns any synchronous
//! iterator into an always-ready source, and [`channel`] bridges elements
//! produced by other threads into a source that suspends its consumer while
//! the queue is empty.

use std::{
    iter::Fuse,
    marker::PhantomData,
    sync::{Arc, Mutex},
    task::{Context, Poll, Waker},
};

use crossbeam_channel::{Receiver, TryRecvError};

/// A pull-based asynchronous sequence of elements.
pub trait Source {
    /// The type of elements this source produces.
    type Item;
    /// The type of failures this source can report.
    type Error;

    /// Attempts to produce the next element.
    ///
    /// `Ok(Some(item))` yields an element, `Ok(None)` reports exhaustion, and
    /// [`Poll::Pending`] promises a wake-up through the registered [`Waker`]
    /// once progress is possible. A source has a single logical cursor: one
    /// consumer calls this at a time (which `&mut self` already enforces).
    ///
    /// An exhausted source must keep reporting `Ok(None)`; combinators may
    /// poll past the first exhaustion.
    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<Self::Item>, Self::Error>>;

    /// Releases the resources owned by this source.
    ///
    /// Called at most once, at any cursor position, including before the
    /// source was ever polled. The source is not polled afterwards.
    fn close(&mut self) -> Result<(), Self::Error>;
}

/// Turns anything iterable into a [`Source`].
///
/// The elements are already in memory, so the source never suspends and never
/// fails. Mostly useful for tests and for mixing fixed prefixes into chains
/// of real sources. The error type is free so that the result can slot into
/// any chain.
pub fn items<I, E>(items: I) -> Items<I::IntoIter, E>
where
    I: IntoIterator,
{
    Items {
        iter: items.into_iter().fuse(),
        _error: PhantomData,
    }
}

/// A [`Source`] over a synchronous iterator. Created with [`items`].
pub struct Items<I, E> {
    iter: Fuse<I>,
    _error: PhantomData<fn() -> E>,
}

impl<I: Iterator, E> Source for Items<I, E> {
    type Item = I::Item;
    type Error = E;

    fn poll_next(&mut self, _cx: &mut Context<'_>) -> Poll<Result<Option<I::Item>, E>> {
        Poll::Ready(Ok(self.iter.next()))
    }

    fn close(&mut self) -> Result<(), E> {
        Ok(())
    }
}

/// Creates a connected pair of [`Sender`] and [`ChannelSource`].
///
/// Elements sent through the [`Sender`] (typically from other threads) come
/// out of the [`ChannelSource`] in send order. The source is exhausted once
/// every [`Sender`] clone has been dropped and the queue has drained.
pub fn channel<T, E>() -> (Sender<T>, ChannelSource<T, E>) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    let waker = Arc::new(Mutex::new(None));
    (
        Sender {
            sender: Some(sender),
            waker: waker.clone(),
        },
        ChannelSource {
            receiver: Some(receiver),
            waker,
            _error: PhantomData,
        },
    )
}

/// The producing half of a [`channel`] source.
pub struct Sender<T> {
    sender: Option<crossbeam_channel::Sender<T>>,
    waker: Arc<Mutex<Option<Waker>>>,
}

impl<T> Sender<T> {
    /// Enqueues an element and wakes the consumer.
    ///
    /// This method does not block or fail. If the connected [`ChannelSource`]
    /// was closed or dropped, `value` is dropped and nothing happens.
    pub fn send(&self, value: T) {
        self.sender.as_ref().unwrap().send(value).ok();
        self.wake();
    }

    fn wake(&self) {
        if let Some(waker) = self.waker.lock().unwrap().take() {
            waker.wake();
        }
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            waker: self.waker.clone(),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        // Disconnect before waking, so a consumer woken by the last sender
        // going away observes the disconnect rather than parking again.
        drop(self.sender.take());
        self.wake();
    }
}

/// The consuming half of a [`channel`], usable wherever a [`Source`] is
/// expected.
///
/// Like [`Items`], it cannot fail, and leaves its error type free.
pub struct ChannelSource<T, E> {
    receiver: Option<Receiver<T>>,
    waker: Arc<Mutex<Option<Waker>>>,
    _error: PhantomData<fn() -> E>,
}

impl<T, E> Source for ChannelSource<T, E> {
    type Item = T;
    type Error = E;

    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<T>, E>> {
        let Some(receiver) = &self.receiver else {
            return Poll::Ready(Ok(None));
        };
        match receiver.try_recv() {
            Ok(value) => return Poll::Ready(Ok(Some(value))),
            Err(TryRecvError::Disconnected) => return Poll::Ready(Ok(None)),
            Err(TryRecvError::Empty) => {}
        }

        *self.waker.lock().unwrap() = Some(cx.waker().clone());
        // A send can slip in between the try_recv above and the waker landing
        // in its slot, in which case nobody would wake us. Check again now
        // that the slot is filled.
        match receiver.try_recv() {
            Ok(value) => Poll::Ready(Ok(Some(value))),
            Err(TryRecvError::Disconnected) => Poll::Ready(Ok(None)),
            Err(TryRecvError::Empty) => Poll::Pending,
        }
    }

    fn close(&mut self) -> Result<(), E> {
        self.receiver = None;
        Ok(())
    }
}
