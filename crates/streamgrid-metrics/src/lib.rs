//! streamgrid-metrics — scrape transport for the rater.
//!
//! Each stage replica exposes its cumulative processed-message counter on a
//! Prometheus-style metrics endpoint. This crate fetches one page per replica
//! over HTTP/1.1, extracts a single named counter, and sums it across the
//! replica's partition labels, yielding one cumulative value per scrape.
//!
//! # Architecture
//!
//! ```text
//! CounterFetcher (trait)
//!   └── HttpCounterFetcher
//!       ├── TcpStream + hyper http1 handshake per scrape
//!       ├── GET http://{replica}:{port}{path}
//!       └── parse::sum_counter() over the text exposition
//! ```
//!
//! Every failure mode (connect, handshake, non-2xx, body, missing metric)
//! surfaces as a [`FetchError`]; the rater treats any error as an absent
//! sample for that replica and tick, never as a fatal condition.

pub mod error;
pub mod fetch;
pub mod parse;

pub use error::{FetchError, FetchResult};
pub use fetch::{CounterFetcher, FetchFuture, HttpCounterFetcher};
