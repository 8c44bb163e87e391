//! The mid-pipeline stage.

use crate::chunk::{Chunk, Encoding};
use crate::completion::{notify_success, Callback, Completion, FlushCompletion, Next};
use crate::error::Result;
use crate::stream::{Stage, StageState, StreamCore};
use std::fmt;
use std::rc::Rc;

/// The processing strategy behind a [`Transform`].
///
/// `transform` reports its output through `done` (`done.ok(value)`,
/// `done.done()` or `done.fail(err)`) and may emit extra outputs with
/// `done.push(..)` beforehand. `flush` runs on `end`, before the stage
/// emits `end`.
///
/// Both take `&self`: the stage may be written to again before a call
/// returns (for instance from the write callback), so keep mutable state
/// in a `Cell` or `RefCell`.
pub trait Transformer {
    fn transform(
        &self,
        chunk: Chunk,
        encoding: Option<Encoding>,
        done: Completion,
    ) -> Result<()>;

    fn flush(&self, done: FlushCompletion) -> Result<()> {
        done.done()
    }
}

type FlushFn = Box<dyn Fn(FlushCompletion) -> Result<()>>;

struct FnTransformer<F> {
    transform: F,
    flush: Option<FlushFn>,
}

impl<F> Transformer for FnTransformer<F>
where
    F: Fn(Chunk, Option<Encoding>, Completion) -> Result<()>,
{
    fn transform(
        &self,
        chunk: Chunk,
        encoding: Option<Encoding>,
        done: Completion,
    ) -> Result<()> {
        (self.transform)(chunk, encoding, done)
    }

    fn flush(&self, done: FlushCompletion) -> Result<()> {
        match self.flush.as_ref() {
            Some(flush) => flush(done),
            None => done.done(),
        }
    }
}

/// A consumer/producer in the middle of a pipeline.
///
/// A produced value is forwarded to the downstream link, if there is one
/// when the transform completes. Failures of that forwarded write are
/// reported on *this* stage, since the completion that observes them
/// belongs here.
pub struct Transform {
    core: Rc<StreamCore>,
    transformer: Rc<dyn Transformer>,
}

impl Transform {
    /// Creates a transform from a function `(chunk, encoding, done)`.
    pub fn new<F>(transform: F) -> Rc<Self>
    where
        F: Fn(Chunk, Option<Encoding>, Completion) -> Result<()> + 'static,
    {
        Self::with_transformer(FnTransformer {
            transform,
            flush: None,
        })
    }

    /// Creates a transform with a flush hook run on `end`.
    pub fn with_flush<F, G>(transform: F, flush: G) -> Rc<Self>
    where
        F: Fn(Chunk, Option<Encoding>, Completion) -> Result<()> + 'static,
        G: Fn(FlushCompletion) -> Result<()> + 'static,
    {
        Self::with_transformer(FnTransformer {
            transform,
            flush: Some(Box::new(flush)),
        })
    }

    pub fn with_transformer(transformer: impl Transformer + 'static) -> Rc<Self> {
        Rc::new(Self {
            core: StreamCore::new(),
            transformer: Rc::new(transformer),
        })
    }

    /// Emits `data` and forwards `chunk` downstream, bypassing the
    /// transform function.
    pub fn push(&self, chunk: impl Into<Chunk>) -> Result<()> {
        self.core.pass_through(chunk.into(), None, None)
    }
}

/// Success branch of a transform completion.
///
/// Empty output is not forwarded (see `Chunk::is_empty`); the original
/// callback then completes right away.
fn forward(
    owner: &Rc<StreamCore>,
    value: Option<Chunk>,
    encoding: Option<Encoding>,
    callback: Option<Callback>,
) -> Result<()> {
    let link = owner.link();
    match (link, value) {
        (Some(link), Some(chunk)) if !chunk.is_empty() => {
            tracing::trace!("forwarding transformed chunk downstream");
            let settle: Next = Box::new(|_, callback| notify_success(callback));
            let inner = Completion::then(owner, callback, Some(settle));
            link.write(chunk, encoding, Some(inner.into_callback()))
        }
        _ => notify_success(callback),
    }
}

impl Stage for Transform {
    fn core(&self) -> &Rc<StreamCore> {
        &self.core
    }

    fn write(
        &self,
        chunk: Chunk,
        encoding: Option<Encoding>,
        callback: Option<Callback>,
    ) -> Result<()> {
        let transformer = self.transformer.clone();
        let owner = self.core.clone();
        let forward_encoding = encoding.clone();
        let next: Next =
            Box::new(move |value, callback| forward(&owner, value, forward_encoding, callback));
        let done = Completion::tracked(&self.core, callback, Some(next));
        transformer.transform(chunk, encoding, done)
    }

    /// Runs the flush hook, then the base `end` whatever the flush outcome.
    fn end(&self) -> Result<()> {
        let transformer = self.transformer.clone();
        tracing::debug!("flushing transform");
        self.core.set_state(StageState::Ending);
        transformer.flush(FlushCompletion::new(&self.core))
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform").field("core", &self.core).finish()
    }
}
