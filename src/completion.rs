//! Completion continuations shared by `Writable` and `Transform`.

use crate::chunk::Chunk;
use crate::error::{Error, Result};
use crate::event::Emission;
use crate::stream::StreamCore;
use std::fmt;
use std::rc::Rc;

/// The per-write callback supplied by the caller of `write`.
///
/// Receives `Some(error)` on failure and `None` on success. A callback
/// returns `Err` only to pass on an escalated error, e.g. when it is
/// itself a completion whose stage has no `error` handler.
pub type Callback = Box<dyn FnOnce(Option<&Error>) -> Result<()>>;

/// The step run when a completion succeeds. It receives the produced
/// value and takes over the original callback.
pub type Next = Box<dyn FnOnce(Option<Chunk>, Option<Callback>) -> Result<()>>;

/// Translates an `(error, value)` outcome into either an error report or
/// a call to the next step.
///
/// On error the original callback (if any) is invoked first, then an
/// `error` event is emitted on the stage that created the completion.
/// On success `next` runs; without `next` the value is dropped.
///
/// Processing functions should return whatever `complete` returns: an
/// `Err` there is an `error` event nobody handled, and it must reach the
/// caller of `write`.
#[must_use = "a completion must be completed exactly once"]
pub struct Completion {
    owner: Rc<StreamCore>,
    callback: Option<Callback>,
    next: Option<Next>,
    tracked: bool,
}

impl Completion {
    /// Builds a completion attributed to `owner`.
    pub fn then(owner: &Rc<StreamCore>, callback: Option<Callback>, next: Option<Next>) -> Self {
        Self {
            owner: owner.clone(),
            callback,
            next,
            tracked: false,
        }
    }

    /// Like `then`, but completing it also settles one in-flight write
    /// on `owner`.
    pub(crate) fn tracked(
        owner: &Rc<StreamCore>,
        callback: Option<Callback>,
        next: Option<Next>,
    ) -> Self {
        owner.begin_write();
        let mut completion = Self::then(owner, callback, next);
        completion.tracked = true;
        completion
    }

    pub fn complete(mut self, result: Result<Option<Chunk>>) -> Result<()> {
        let tracked = std::mem::replace(&mut self.tracked, false);
        match result {
            Err(err) => {
                if tracked {
                    self.owner.finish_write(true);
                } else {
                    self.owner.mark_errored();
                }
                let notified = match self.callback.take() {
                    Some(callback) => callback(Some(&err)),
                    None => Ok(()),
                };
                let emitted = self.owner.emit(Emission::Error(&err));
                notified.and(emitted)
            }
            Ok(value) => {
                if tracked {
                    self.owner.finish_write(false);
                }
                match self.next.take() {
                    Some(next) => next(value, self.callback.take()),
                    None => Ok(()),
                }
            }
        }
    }

    /// Succeeds with a produced value.
    pub fn ok(self, chunk: impl Into<Chunk>) -> Result<()> {
        self.complete(Ok(Some(chunk.into())))
    }

    /// Succeeds without a value.
    pub fn done(self) -> Result<()> {
        self.complete(Ok(None))
    }

    pub fn fail(self, err: Error) -> Result<()> {
        self.complete(Err(err))
    }

    /// Emits `data` on the owning stage and forwards `chunk` downstream
    /// without running any processing function. Lets a transform emit
    /// several outputs for one input.
    pub fn push(&self, chunk: impl Into<Chunk>) -> Result<()> {
        self.owner.pass_through(chunk.into(), None, None)
    }

    /// Turns the completion into a plain write callback, so it can be
    /// handed to a downstream `write`.
    pub fn into_callback(self) -> Callback {
        Box::new(move |err| match err {
            Some(err) => self.fail(err.clone()),
            None => self.done(),
        })
    }
}

/// Reports success to the original caller, if it supplied a callback.
pub(crate) fn notify_success(callback: Option<Callback>) -> Result<()> {
    match callback {
        Some(callback) => callback(None),
        None => Ok(()),
    }
}

/// A tracked completion dropped without being completed abandons its
/// write: the in-flight count is settled, the callback is never invoked
/// and no event is emitted.
impl Drop for Completion {
    fn drop(&mut self) {
        if self.tracked {
            tracing::debug!("completion dropped without completing");
            self.owner.finish_write(false);
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("callback", &self.callback.is_some())
            .field("next", &self.next.is_some())
            .field("tracked", &self.tracked)
            .finish()
    }
}

/// Completion handed to a transform's flush hook.
///
/// Completing it emits `error` on failure and then, regardless of the
/// outcome, runs the base `end` (emit `end`, propagate downstream).
#[must_use = "a flush completion must be completed to end the stage"]
pub struct FlushCompletion {
    owner: Rc<StreamCore>,
}

impl FlushCompletion {
    pub(crate) fn new(owner: &Rc<StreamCore>) -> Self {
        Self {
            owner: owner.clone(),
        }
    }

    pub fn complete(self, error: Option<Error>) -> Result<()> {
        let escalated = match &error {
            Some(err) => {
                tracing::debug!(error = %err, "flush failed");
                self.owner.emit(Emission::Error(err))
            }
            None => Ok(()),
        };
        let ended = self.owner.end_pass_through();
        escalated.and(ended)
    }

    pub fn done(self) -> Result<()> {
        self.complete(None)
    }

    pub fn fail(self, err: Error) -> Result<()> {
        self.complete(Some(err))
    }

    /// Emits trailing output before the stage ends.
    pub fn push(&self, chunk: impl Into<Chunk>) -> Result<()> {
        self.owner.pass_through(chunk.into(), None, None)
    }
}

impl fmt::Debug for FlushCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlushCompletion").finish_non_exhaustive()
    }
}
