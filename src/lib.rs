//! # pipestage
//!
//! A small, single-threaded chunk streaming library: stages linked with
//! `pipe`, chunks flowing downstream through `write`, per-write
//! completion callbacks and an `error` event that refuses to be ignored.
//!
//! ## Overview
//!
//! Every stage holds at most one downstream link and at most one handler
//! per event (`data`, `end`, `error`). Three stage kinds are provided:
//!
//! * **`PassThrough`**: emits `data` and forwards each write unchanged
//! * **`Writable`**: a terminal stage driven by a [`Sink`] (or a closure)
//! * **`Transform`**: a mid-pipeline stage driven by a [`Transformer`]
//!   (or a closure), forwarding each produced value downstream
//!
//! Processing functions receive a [`Completion`] and report through it
//! exactly once. A failure invokes the caller's callback *and* emits
//! `error` on the stage owning the completion. If that stage has no
//! `error` handler, the error comes back as `Err` from the `write` or
//! `end` call that led to it.
//!
//! ## Quick Start
//!
//! ```rust
//! use pipestage::*;
//! use serde_json::json;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! fn main() -> Result<()> {
//!     let seen = Rc::new(RefCell::new(Vec::new()));
//!
//!     let to_json = Transform::new(|chunk, _encoding, done| match chunk.to_json() {
//!         Ok(text) => done.ok(text),
//!         Err(err) => done.fail(err),
//!     });
//!     let record = seen.clone();
//!     let sink = Writable::new(move |chunk, _encoding, done| {
//!         record.borrow_mut().push(chunk.to_string());
//!         done.done()
//!     });
//!
//!     to_json.pipe(PassThrough::new()).pipe(sink);
//!     to_json.write_chunk(json!({"is": 42}))?;
//!     to_json.end()?;
//!
//!     assert_eq!(*seen.borrow(), vec![r#"{"is":42}"#.to_string()]);
//!     Ok(())
//! }
//! ```
//!
//! ## Limitations
//!
//! There is no buffering or backpressure. A stage accepts a new write
//! before the previous one completed, and overlapping completions may
//! fire in any order; [`Stage::in_flight`] and [`Stage::state`] make that
//! observable but do not prevent it.

pub mod chunk;
pub mod completion;
pub mod error;
pub mod event;
pub mod io;
pub mod stream;
pub mod transform;
pub mod writable;

// Re-export the main public API for user convenience.
pub use chunk::{Chunk, Encoding};
pub use completion::{Callback, Completion, FlushCompletion, Next};
pub use error::{Error, Result};
pub use event::{Emission, Event, Handler, Listeners};
pub use io::{pump, IoSink};
pub use stream::{PassThrough, Stage, StageState, StreamCore};
pub use transform::{Transform, Transformer};
pub use writable::{Sink, Writable};
