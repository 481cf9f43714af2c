//! A small library for combining one-shot cancellation signals and chaining
//! asynchronous element sources.
//!
//! # Overview
//!
//! This library features two independent families of primitives. Neither
//! creates the resources it combines: callers own their signals and sources,
//! the combinators only observe state changes or take over lifecycle duties
//! for the duration of the composition.
//!
//! ## Signals and their aggregation
//!
//! [`signal`] creates a one-shot event as a [`SignalSource`]/[`Signal`] pair:
//! the source fires it (at most once, observably), any number of cloned
//! handles observe it. The [`aggregate`] module folds many signals into one
//! result: [`aggregate::first_fired`] completes with the identity of
//! whichever signal fires first, [`aggregate::all_fired`] completes once
//! every signal has fired, and the [`aggregate::ensure_none_fired`] /
//! [`aggregate::ensure_not_all_fired`] checks answer the same questions
//! synchronously, at a single point in time.
//!
//! Everything here is runtime-independent: each waiting operation exists both
//! as a blocking call (no executor needed) and as a plain [`Future`] usable
//! from any async runtime, and signals may fire from any thread.
//!
//! ```
//! use tributary::{signal, aggregate};
//!
//! let (stop, stop_signal) = signal();
//! let (_fault, fault_signal) = signal();
//!
//! // One future over both ways the work could be interrupted.
//! let interrupted = aggregate::first_fired([stop_signal.clone(), fault_signal]);
//! assert!(!interrupted.is_complete());
//!
//! stop.fire();
//! assert!(interrupted.block().unwrap().same_source(&stop_signal));
//! ```
//!
//! ## Chained sources
//!
//! A [`Source`] is a pull-based asynchronous sequence with an owned teardown
//! step. [`Chain`] strings any number of them into one logical sequence that
//! drains each source in turn, can grow at any time ([`Chain::push`],
//! [`Chain::extend`]), and tears all of them down in a single best-effort
//! pass that reports every failure instead of the first
//! ([`Chain::close`]).
//!
//! ```
//! use tributary::chain::Chain;
//! use tributary::source::items;
//!
//! let mut merged: Chain<u32, std::io::Error> = Chain::new();
//! merged.push(items([1, 2]));
//! merged.push(items([3]));
//!
//! assert_eq!(merged.block_next().unwrap(), Some(1));
//! assert_eq!(merged.block_next().unwrap(), Some(2));
//! assert_eq!(merged.block_next().unwrap(), Some(3));
//! assert_eq!(merged.block_next().unwrap(), None);
//! merged.close().unwrap();
//! ```
//!
//! [`Future`]: std::future::Future

mod park;

pub mod aggregate;
pub mod chain;
pub mod signal;
pub mod source;

pub use chain::Chain;
pub use signal::{signal, Signal, SignalSource};
pub use source::Source;
