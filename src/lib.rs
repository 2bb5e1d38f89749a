//! # Call Throttler
//! Many APIs only accept a certain number of calls per period of time - e.g. 100 calls in any 10 second window - and answer anything beyond that with errors. This crate protects such a service from bursts of asynchronous calls: every call goes through a [`Throttler`], which queues it, runs the queue one call at a time in submission order, and waits whenever starting another call would put more than `limit` dispatches into the trailing window.
//!
//! Each submission gets its own [`Completion`], which resolves with exactly what the operation returned - including its own errors - once the call has actually run.
//!
//! # Example
//! Here, we create a throttler that allows 2 calls every 1 second, and submit 3 calls at once. The first two run immediately, while the third runs after 1 second, when the first dispatch has left the window.
//! ```
//! # use tokio::time::Instant;
//! # use call_throttler::Throttler;
//! # use std::time::Duration;
//! # use futures::join;
//! # #[tokio::main]
//! # async fn main() {
//!     let throttler = Throttler::new(2, Duration::from_secs(1)).unwrap();
//!     let start = Instant::now();
//!     let fetch = move |id: u32| async move {
//!         println!("Fetching {} at {:?}", id, Instant::now() - start);
//!         Ok::<_, String>(format!("record {}", id))
//!     };
//!     let (a, b, c) = join!(
//!         throttler.call(fetch, 1),
//!         throttler.call(fetch, 2),
//!         throttler.call(fetch, 3)
//!     );
//!     println!("{:?} {:?} {:?}", a, b, c);
//!     assert_eq!(throttler.total_dispatched(), 3);
//!
//!     // Fetching 1 at 12.1µs
//!     // Fetching 2 at 20.4µs
//!     // Fetching 3 at 1.000163s
//!     // Ok(Ok("record 1")) Ok(Ok("record 2")) Ok(Ok("record 3"))
//! # }
//! ```
//!
//! # Limitations
//! Only one call is ever in flight: call `k+1` is not started until call `k` has finished, so the
//! rate limit is a ceiling on top of that seriality. There are no timeouts - a call that never
//! finishes stalls every call queued behind it.
//!
//! Calls are not retried, and nothing survives a restart of the process.

mod completion;
mod config;
mod error;
mod throttler;
mod window;

pub use completion::Completion;
pub use config::{ThrottlerConfig, DEFAULT_LIMIT, DEFAULT_WINDOW};
pub use error::{ConfigError, DispatchError};
pub use throttler::Throttler;
pub use window::SlidingWindow;
