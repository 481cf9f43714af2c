//! Chaining of element sources.
//!
//! [`Chain`] owns an ordered, growable list of [`Source`]s and presents them
//! as one logical source: each is drained to exhaustion before the next one
//! is touched, and sources can be appended at any time, even while iteration
//! is underway, without disturbing anything already consumed.
//!
//! The combiner owns the teardown of everything it holds: [`Chain::close`]
//! attempts to close *every* source, whether exhausted, mid-consumption, or
//! never reached, and reports all failures together as one
//! [`CloseErrors`] value.
//!
//! # Examples
//!
//! ```
//! use tributary::chain::Chain;
//! use tributary::source::items;
//!
//! let mut chain: Chain<i32, std::io::Error> = Chain::new();
//! chain.push(items([1, 2]));
//! chain.push(items([3]));
//!
//! assert_eq!(chain.block_next().unwrap(), Some(1));
//! assert_eq!(chain.block_next().unwrap(), Some(2));
//!
//! // Growing a live chain never reorders what came before.
//! chain.push(items([4]));
//! assert_eq!(chain.block_next().unwrap(), Some(3));
//! assert_eq!(chain.block_next().unwrap(), Some(4));
//! assert_eq!(chain.block_next().unwrap(), None);
//!
//! chain.close().unwrap();
//! ```

use std::{
    error::Error,
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{park, source::Source};

/// A combined source draining an ordered list of [`Source`]s in turn.
///
/// Elements come out in exact concatenation order of the list as it existed
/// at each point in time. The internal cursor only moves forward: a source
/// that has reported exhaustion is never revisited, even when new sources are
/// appended behind it.
pub struct Chain<T, E> {
    sources: Vec<Box<dyn Source<Item = T, Error = E> + Send>>,
    cursor: usize,
}

impl<T, E> Chain<T, E> {
    /// Creates an empty chain. With no sources it is already exhausted.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            cursor: 0,
        }
    }

    /// Appends a source to the end of the chain.
    ///
    /// Safe at any point of iteration; the new source lands strictly after
    /// everything already present. Appending after the chain has reported
    /// end-of-sequence revives it: only the new sources are drained.
    pub fn push<S>(&mut self, source: S)
    where
        S: Source<Item = T, Error = E> + Send + 'static,
    {
        self.sources.push(Box::new(source));
    }

    /// Appends every source of another chain, splicing the lists flat.
    ///
    /// The merged chain owns all sources of both, including those `other`
    /// had already exhausted, which keep their place in the close order. No
    /// nesting is involved, so repeated chaining never deepens indirection.
    pub fn extend(&mut self, mut other: Chain<T, E>) {
        self.sources.append(&mut other.sources);
        other.cursor = 0;
    }

    /// Returns the number of sources currently owned, exhausted ones
    /// included. [`Chain::close`] resets this to 0.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns whether the chain owns no sources.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Attempts to produce the next element of the combined sequence.
    ///
    /// Polls the source under the cursor, moving on to the next one whenever
    /// the current reports exhaustion. Once the cursor passes the last
    /// source, `Ok(None)` is reported, stably. A source's failure is
    /// propagated unmodified, and the cursor stays where it is: a failing
    /// source stops the combined sequence rather than being skipped.
    ///
    /// The chain suspends exactly when the current source suspends; it adds
    /// no waiting of its own.
    pub fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<T>, E>> {
        while let Some(source) = self.sources.get_mut(self.cursor) {
            match source.poll_next(cx) {
                Poll::Ready(Ok(Some(item))) => return Poll::Ready(Ok(Some(item))),
                Poll::Ready(Ok(None)) => self.cursor += 1,
                Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(Ok(None))
    }

    /// Produces the next element of the combined sequence.
    ///
    /// The async counterpart of [`Chain::poll_next`]; see there for the
    /// semantics.
    pub async fn next(&mut self) -> Result<Option<T>, E> {
        struct Next<'a, T, E>(&'a mut Chain<T, E>);

        impl<T, E> Future for Next<'_, T, E> {
            type Output = Result<Option<T>, E>;

            fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
                self.0.poll_next(cx)
            }
        }

        Next(self).await
    }

    /// Produces the next element, blocking the calling thread while the
    /// current source has none ready.
    ///
    /// The sync twin of [`Chain::next`], for use without an executor.
    pub fn block_next(&mut self) -> Result<Option<T>, E> {
        park::block_on(self.next())
    }

    /// Closes every owned source and empties the chain.
    ///
    /// Sources are closed in list order, regardless of the cursor position:
    /// consumed, mid-consumption and never-reached sources alike. A failure
    /// never prevents the close attempts on the remaining sources; once every
    /// attempt has been made, the collected failures (if any) are reported
    /// together as one [`CloseErrors`].
    ///
    /// The chain is empty afterwards, so a second call is a no-op `Ok(())`:
    /// no source ever sees more than one close.
    pub fn close(&mut self) -> Result<(), CloseErrors<E>> {
        let mut errors = Vec::new();
        for mut source in self.sources.drain(..) {
            if let Err(err) = source.close() {
                errors.push(err);
            }
        }
        self.cursor = 0;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CloseErrors { errors })
        }
    }
}

impl<T, E> Default for Chain<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Drop for Chain<T, E> {
    fn drop(&mut self) {
        if self.sources.is_empty() {
            return;
        }
        // Best-effort teardown for chains dropped without close(). The error
        // values cannot be reported from here, only counted.
        let total = self.sources.len();
        let mut failed = 0usize;
        for mut source in self.sources.drain(..) {
            if source.close().is_err() {
                failed += 1;
            }
        }
        if failed != 0 {
            log::warn!("chain dropped without close(): discarded {failed} close error(s) from {total} source(s)");
        }
    }
}

/// The aggregate failure of a [`Chain::close`] pass.
///
/// Carries every individual close error, in close (list) order. Produced only
/// when at least one source failed to close.
#[derive(Debug)]
pub struct CloseErrors<E> {
    errors: Vec<E>,
}

impl<E> CloseErrors<E> {
    /// The individual close errors, in close order.
    pub fn errors(&self) -> &[E] {
        &self.errors
    }

    /// Consumes the aggregate, returning the individual errors.
    pub fn into_errors(self) -> Vec<E> {
        self.errors
    }

    /// The number of sources that failed to close. Always at least 1.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Always `false`; present for form's sake.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl<E> fmt::Display for CloseErrors<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} source(s) failed to close", self.errors.len())
    }
}

impl<E: fmt::Debug> Error for CloseErrors<E> {}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        io,
        sync::{Arc, Mutex},
        task::{Wake, Waker},
    };

    use crate::{
        source::{channel, items},
        test::background,
    };

    use super::*;

    fn assert_send<T: Send>() {}

    fn noop_waker() -> Waker {
        struct NoopWaker;
        impl Wake for NoopWaker {
            fn wake(self: Arc<Self>) {}
        }
        Waker::from(Arc::new(NoopWaker))
    }

    /// A source that records its own close into a shared log, optionally
    /// failing it.
    struct Probe {
        id: usize,
        items: VecDeque<i32>,
        fail_close: bool,
        closed: Arc<Mutex<Vec<usize>>>,
    }

    impl Probe {
        fn new(id: usize, items: &[i32], closed: &Arc<Mutex<Vec<usize>>>) -> Self {
            Self {
                id,
                items: items.iter().copied().collect(),
                fail_close: false,
                closed: closed.clone(),
            }
        }

        fn failing_close(mut self) -> Self {
            self.fail_close = true;
            self
        }
    }

    impl Source for Probe {
        type Item = i32;
        type Error = io::Error;

        fn poll_next(&mut self, _cx: &mut Context<'_>) -> Poll<Result<Option<i32>, io::Error>> {
            Poll::Ready(Ok(self.items.pop_front()))
        }

        fn close(&mut self) -> Result<(), io::Error> {
            self.closed.lock().unwrap().push(self.id);
            if self.fail_close {
                Err(io::Error::other(format!("probe {} failed to close", self.id)))
            } else {
                Ok(())
            }
        }
    }

    /// A source that fails every poll.
    struct Broken;

    impl Source for Broken {
        type Item = i32;
        type Error = io::Error;

        fn poll_next(&mut self, _cx: &mut Context<'_>) -> Poll<Result<Option<i32>, io::Error>> {
            Poll::Ready(Err(io::Error::other("broken source")))
        }

        fn close(&mut self) -> Result<(), io::Error> {
            Ok(())
        }
    }

    #[test]
    fn yields_in_concatenation_order() {
        let mut chain: Chain<i32, io::Error> = Chain::new();
        chain.push(items([1, 2]));
        chain.push(items::<[i32; 0], _>([]));
        chain.push(items([3]));

        assert_eq!(chain.block_next().unwrap(), Some(1));
        assert_eq!(chain.block_next().unwrap(), Some(2));
        assert_eq!(chain.block_next().unwrap(), Some(3));
        assert_eq!(chain.block_next().unwrap(), None);
        // End-of-sequence is stable.
        assert_eq!(chain.block_next().unwrap(), None);
        chain.close().unwrap();
    }

    #[test]
    fn empty_chain_is_exhausted() {
        let mut chain: Chain<i32, io::Error> = Chain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.block_next().unwrap(), None);
        chain.close().unwrap();
    }

    #[test]
    fn push_mid_iteration_lands_after_current() {
        let mut chain: Chain<i32, io::Error> = Chain::new();
        chain.push(items([1, 2]));
        chain.push(items([3]));

        assert_eq!(chain.block_next().unwrap(), Some(1));
        assert_eq!(chain.block_next().unwrap(), Some(2));

        chain.push(items([4, 5]));
        assert_eq!(chain.block_next().unwrap(), Some(3));
        assert_eq!(chain.block_next().unwrap(), Some(4));
        assert_eq!(chain.block_next().unwrap(), Some(5));
        assert_eq!(chain.block_next().unwrap(), None);
        chain.close().unwrap();
    }

    #[test]
    fn push_after_exhaustion_revives() {
        let mut chain: Chain<i32, io::Error> = Chain::new();
        chain.push(items([1]));
        assert_eq!(chain.block_next().unwrap(), Some(1));
        assert_eq!(chain.block_next().unwrap(), None);

        chain.push(items([7]));
        assert_eq!(chain.block_next().unwrap(), Some(7));
        assert_eq!(chain.block_next().unwrap(), None);
        chain.close().unwrap();
    }

    #[test]
    fn extend_splices_flat() {
        let closed = Arc::new(Mutex::new(Vec::new()));

        let mut first: Chain<i32, io::Error> = Chain::new();
        first.push(Probe::new(0, &[1], &closed));
        first.push(Probe::new(1, &[2], &closed));

        let mut second: Chain<i32, io::Error> = Chain::new();
        second.push(Probe::new(2, &[3], &closed));
        second.push(Probe::new(3, &[4], &closed));

        first.extend(second);
        assert_eq!(first.len(), 4);

        for expected in 1..=4 {
            assert_eq!(first.block_next().unwrap(), Some(expected));
        }
        assert_eq!(first.block_next().unwrap(), None);

        // One flat list: a single close pass covers all four, in order.
        first.close().unwrap();
        assert_eq!(*closed.lock().unwrap(), [0, 1, 2, 3]);
    }

    #[test]
    fn extend_keeps_consumed_sources_for_teardown() {
        let closed = Arc::new(Mutex::new(Vec::new()));

        let mut donor: Chain<i32, io::Error> = Chain::new();
        donor.push(Probe::new(0, &[1], &closed));
        donor.push(Probe::new(1, &[2], &closed));
        assert_eq!(donor.block_next().unwrap(), Some(1));

        let mut chain: Chain<i32, io::Error> = Chain::new();
        chain.push(Probe::new(2, &[3], &closed));
        chain.extend(donor);

        assert_eq!(chain.len(), 3);
        assert_eq!(chain.block_next().unwrap(), Some(3));
        assert_eq!(chain.block_next().unwrap(), Some(2));
        assert_eq!(chain.block_next().unwrap(), None);

        chain.close().unwrap();
        assert_eq!(*closed.lock().unwrap(), [2, 0, 1]);
    }

    #[test]
    fn close_reports_every_failure_and_closes_everything() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let mut chain: Chain<i32, io::Error> = Chain::new();
        chain.push(Probe::new(0, &[1], &closed));
        chain.push(Probe::new(1, &[2], &closed).failing_close());
        chain.push(Probe::new(2, &[3], &closed));

        assert_eq!(chain.block_next().unwrap(), Some(1));

        let errors = chain.close().unwrap_err();
        // All three sources got their close attempt, in list order...
        assert_eq!(*closed.lock().unwrap(), [0, 1, 2]);
        // ...and exactly the one failure was reported.
        assert_eq!(errors.len(), 1);
        assert!(errors.errors()[0].to_string().contains("probe 1"));

        // The close pass drained the chain; closing again is a no-op.
        assert!(chain.is_empty());
        chain.close().unwrap();
        assert_eq!(closed.lock().unwrap().len(), 3);
    }

    #[test]
    fn drop_closes_remaining_sources() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        {
            let mut chain: Chain<i32, io::Error> = Chain::new();
            chain.push(Probe::new(0, &[1], &closed));
            chain.push(Probe::new(1, &[2], &closed).failing_close());
            assert_eq!(chain.block_next().unwrap(), Some(1));
        }
        assert_eq!(*closed.lock().unwrap(), [0, 1]);
    }

    #[test]
    fn source_failure_stops_the_sequence() {
        let mut chain: Chain<i32, io::Error> = Chain::new();
        chain.push(items([1]));
        chain.push(Broken);
        chain.push(items([3]));

        assert_eq!(chain.block_next().unwrap(), Some(1));
        chain.block_next().unwrap_err();
        // The failing source is not skipped; the chain does not move on to
        // the elements behind it.
        chain.block_next().unwrap_err();
        chain.close().unwrap();
    }

    #[test]
    fn suspends_on_the_current_source_only() {
        let (sender, source) = channel::<i32, io::Error>();
        let mut chain: Chain<i32, io::Error> = Chain::new();
        chain.push(source);
        chain.push(items([9]));

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        // The channel is empty but alive: the chain pends instead of
        // skipping ahead to the later source.
        assert!(chain.poll_next(&mut cx).is_pending());

        sender.send(4);
        assert!(matches!(chain.poll_next(&mut cx), Poll::Ready(Ok(Some(4)))));
        drop(sender);
        assert!(matches!(chain.poll_next(&mut cx), Poll::Ready(Ok(Some(9)))));
        assert!(matches!(chain.poll_next(&mut cx), Poll::Ready(Ok(None))));
        chain.close().unwrap();
    }

    #[test]
    fn blocks_across_threads() {
        let (sender, source) = channel::<i32, io::Error>();
        let mut chain: Chain<i32, io::Error> = Chain::new();
        chain.push(source);

        let bg = background(move || {
            sender.send(1);
            sender.send(2);
        });

        assert_eq!(chain.block_next().unwrap(), Some(1));
        assert_eq!(chain.block_next().unwrap(), Some(2));
        assert_eq!(chain.block_next().unwrap(), None);
        bg.join();
        chain.close().unwrap();
    }

    #[test]
    fn chain_is_send() {
        assert_send::<Chain<i32, io::Error>>();
    }
}
