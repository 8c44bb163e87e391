//! The base stream: downstream link, event table and pass-through behavior.

use crate::chunk::{Chunk, Encoding};
use crate::completion::Callback;
use crate::error::{Error, Result};
use crate::event::{Emission, Event, Handler, Listeners};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Observable lifecycle of a stage.
///
/// `Writable` and `Transform` move through
/// `Idle -> Writing -> (Idle | Errored)` per write and
/// `Ending -> Ended` on `end`. `Ended` is sticky. `PassThrough` has no
/// asynchronous work and only records `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageState {
    #[default]
    Idle,
    Writing,
    Errored,
    Ending,
    Ended,
}

/// State shared by every stage kind and by the completions it hands out.
///
/// Holds the single downstream link, the handler table and the
/// write bookkeeping. Completions keep an `Rc` to the core of the stage
/// that created them, so errors are attributed to that stage.
#[derive(Default)]
pub struct StreamCore {
    link: RefCell<Option<Rc<dyn Stage>>>,
    listeners: Listeners,
    state: Cell<StageState>,
    in_flight: Cell<usize>,
}

impl StreamCore {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Replaces (or clears) the downstream link.
    pub fn set_link(&self, target: Option<Rc<dyn Stage>>) {
        let previous = self.link.replace(target);
        if previous.is_some() {
            tracing::debug!("replaced downstream link");
        }
    }

    /// Returns the current downstream link. The borrow is released before
    /// returning so the caller may write into the link freely.
    pub fn link(&self) -> Option<Rc<dyn Stage>> {
        self.link.borrow().clone()
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub fn emit(&self, emission: Emission<'_>) -> Result<()> {
        tracing::trace!(event = ?emission.event(), "emit");
        self.listeners.emit(emission)
    }

    /// Base write: emit `data`, then forward unchanged to the link.
    pub fn pass_through(
        &self,
        chunk: Chunk,
        encoding: Option<Encoding>,
        callback: Option<Callback>,
    ) -> Result<()> {
        self.emit(Emission::Data(&chunk))?;
        if let Some(link) = self.link() {
            tracing::trace!("forwarding chunk downstream");
            link.write(chunk, encoding, callback)?;
        }
        Ok(())
    }

    /// Base end: emit `end`, then forward `end` to the link.
    pub fn end_pass_through(&self) -> Result<()> {
        self.state.set(StageState::Ending);
        let emitted = self.emit(Emission::End);
        self.state.set(StageState::Ended);
        emitted?;
        if let Some(link) = self.link() {
            tracing::debug!("propagating end downstream");
            link.end()?;
        }
        Ok(())
    }

    pub fn state(&self) -> StageState {
        self.state.get()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.get()
    }

    pub(crate) fn set_state(&self, state: StageState) {
        self.state.set(state);
    }

    pub(crate) fn begin_write(&self) {
        self.in_flight.set(self.in_flight.get() + 1);
        if !self.is_ending() {
            self.state.set(StageState::Writing);
        }
    }

    /// Settles one in-flight write.
    pub(crate) fn finish_write(&self, failed: bool) {
        self.in_flight.set(self.in_flight.get().saturating_sub(1));
        if failed {
            self.mark_errored();
        } else if self.in_flight.get() == 0 && self.state.get() == StageState::Writing {
            self.state.set(StageState::Idle);
        }
    }

    pub(crate) fn mark_errored(&self) {
        if !self.is_ending() {
            self.state.set(StageState::Errored);
        }
    }

    fn is_ending(&self) -> bool {
        matches!(self.state.get(), StageState::Ending | StageState::Ended)
    }
}

impl fmt::Debug for StreamCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCore")
            .field("piped", &self.link.borrow().is_some())
            .field("listeners", &self.listeners)
            .field("state", &self.state.get())
            .field("in_flight", &self.in_flight.get())
            .finish()
    }
}

/// One node of a pipeline.
///
/// Implementors provide `core` and `write`; everything else is shared.
/// Stages are handed around as `Rc<S>` (or `Rc<dyn Stage>` once linked).
pub trait Stage {
    fn core(&self) -> &Rc<StreamCore>;

    /// Accepts a chunk. `encoding` and `callback` are passed through to
    /// whichever processing function ends up handling the chunk.
    ///
    /// An `Err` means an `error` event had no handler somewhere along the
    /// synchronous part of the chain.
    fn write(
        &self,
        chunk: Chunk,
        encoding: Option<Encoding>,
        callback: Option<Callback>,
    ) -> Result<()>;

    /// Emits `end` and propagates it downstream.
    fn end(&self) -> Result<()> {
        self.core().end_pass_through()
    }

    /// Sets `target` as the only downstream link and returns it,
    /// so `a.pipe(b).pipe(c)` builds a chain.
    fn pipe<S: Stage + 'static>(&self, target: Rc<S>) -> Rc<S>
    where
        Self: Sized,
    {
        tracing::debug!("pipe");
        self.core().set_link(Some(target.clone()));
        target
    }

    /// `pipe` for targets already erased to `Rc<dyn Stage>`.
    fn pipe_dyn(&self, target: Rc<dyn Stage>) -> Rc<dyn Stage> {
        tracing::debug!("pipe");
        self.core().set_link(Some(target.clone()));
        target
    }

    /// Clears the downstream link. Idempotent.
    fn unpipe(&self) {
        tracing::debug!("unpipe");
        self.core().set_link(None);
    }

    fn downstream(&self) -> Option<Rc<dyn Stage>> {
        self.core().link()
    }

    /// Registers the sole handler for `event`, replacing any previous one.
    fn on<H>(&self, event: Event, handler: H)
    where
        Self: Sized,
        H: FnMut(&Emission<'_>) + 'static,
    {
        self.core().listeners().set(event, Box::new(handler));
    }

    /// `on` for stages held as `Rc<dyn Stage>`.
    fn on_dyn(&self, event: Event, handler: Handler) {
        self.core().listeners().set(event, handler);
    }

    fn on_data<H>(&self, mut handler: H)
    where
        Self: Sized,
        H: FnMut(&Chunk) + 'static,
    {
        self.on(Event::Data, move |emission| {
            if let Emission::Data(chunk) = emission {
                handler(chunk);
            }
        });
    }

    fn on_end<H>(&self, mut handler: H)
    where
        Self: Sized,
        H: FnMut() + 'static,
    {
        self.on(Event::End, move |_| handler());
    }

    fn on_error<H>(&self, mut handler: H)
    where
        Self: Sized,
        H: FnMut(&Error) + 'static,
    {
        self.on(Event::Error, move |emission| {
            if let Emission::Error(err) = emission {
                handler(err);
            }
        });
    }

    /// Invokes the handler for the emission's event. An `error` emission
    /// without a handler returns the error as `Err`.
    fn emit(&self, emission: Emission<'_>) -> Result<()> {
        self.core().emit(emission)
    }

    /// `write` without encoding or callback.
    fn write_chunk(&self, chunk: impl Into<Chunk>) -> Result<()>
    where
        Self: Sized,
    {
        self.write(chunk.into(), None, None)
    }

    fn state(&self) -> StageState {
        self.core().state()
    }

    /// Number of writes handed to the processing function whose
    /// completion has not fired yet. Dropping a completion without
    /// completing it also settles its write.
    fn in_flight(&self) -> usize {
        self.core().in_flight()
    }
}

/// The base stage: emits `data` and forwards every write untouched.
///
/// A pass-through never invokes write callbacks itself; that is left to
/// whichever stage terminates the chain.
#[derive(Debug, Default)]
pub struct PassThrough {
    core: Rc<StreamCore>,
}

impl PassThrough {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }
}

impl Stage for PassThrough {
    fn core(&self) -> &Rc<StreamCore> {
        &self.core
    }

    fn write(
        &self,
        chunk: Chunk,
        encoding: Option<Encoding>,
        callback: Option<Callback>,
    ) -> Result<()> {
        self.core.pass_through(chunk, encoding, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<String>>>;

    /// Records every call it receives, including the callback's presence.
    struct Probe {
        core: Rc<StreamCore>,
        log: Log,
    }

    impl Stage for Probe {
        fn core(&self) -> &Rc<StreamCore> {
            &self.core
        }

        fn write(
            &self,
            chunk: Chunk,
            encoding: Option<Encoding>,
            callback: Option<Callback>,
        ) -> Result<()> {
            self.log.borrow_mut().push(format!(
                "write {chunk} {:?} {}",
                encoding.map(|e| e.to_string()),
                callback.is_some()
            ));
            Ok(())
        }

        fn end(&self) -> Result<()> {
            self.log.borrow_mut().push("end".into());
            Ok(())
        }
    }

    fn probe(log: &Log) -> Rc<Probe> {
        Rc::new(Probe {
            core: StreamCore::new(),
            log: log.clone(),
        })
    }

    #[test]
    fn data_event_fires_before_forward() {
        let log: Log = Rc::default();
        let stream = PassThrough::new();
        let l = log.clone();
        stream.on_data(move |chunk| l.borrow_mut().push(format!("data {chunk}")));
        stream.pipe(probe(&log));

        stream
            .write("a".into(), Some("utf8".into()), Some(Box::new(|_| Ok(()))))
            .unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["data a".to_string(), "write a Some(\"utf8\") true".to_string()]
        );
    }

    #[test]
    fn pipe_replaces_previous_link() {
        let first: Log = Rc::default();
        let second: Log = Rc::default();
        let stream = PassThrough::new();
        stream.pipe(probe(&first));
        stream.pipe(probe(&second));

        stream.write_chunk("x").unwrap();

        assert!(first.borrow().is_empty());
        assert_eq!(second.borrow().len(), 1);
    }

    #[test]
    fn unpipe_is_idempotent() {
        let log: Log = Rc::default();
        let stream = PassThrough::new();
        stream.pipe(probe(&log));
        stream.unpipe();
        stream.unpipe();
        assert!(stream.downstream().is_none());

        stream.write_chunk("x").unwrap();
        stream.end().unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn end_emits_then_propagates() {
        let log: Log = Rc::default();
        let stream = PassThrough::new();
        let l = log.clone();
        stream.on_end(move || l.borrow_mut().push("ended".into()));
        stream.pipe(probe(&log));

        stream.end().unwrap();

        assert_eq!(*log.borrow(), vec!["ended".to_string(), "end".to_string()]);
        assert_eq!(stream.state(), StageState::Ended);
    }

    #[test]
    fn pipe_returns_target_for_chaining() {
        let log: Log = Rc::default();
        let a = PassThrough::new();
        let b = PassThrough::new();
        let sink = probe(&log);
        let tail = a.pipe(b.clone()).pipe(sink.clone());
        assert!(Rc::ptr_eq(&tail, &sink));

        a.write_chunk("chained").unwrap();
        assert_eq!(log.borrow().len(), 1);
        assert!(b.downstream().is_some());
    }

    #[test]
    fn emit_error_without_handler_fails() {
        let stream = PassThrough::new();
        let err = Error::operation("nobody listens");
        let result = stream.emit(Emission::Error(&err));
        assert_eq!(result.unwrap_err().to_string(), "Error: nobody listens");
    }
}
