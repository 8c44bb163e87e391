//! The terminal stage.

use crate::chunk::{Chunk, Encoding};
use crate::completion::{notify_success, Callback, Completion, Next};
use crate::error::Result;
use crate::stream::{Stage, StreamCore};
use std::fmt;
use std::rc::Rc;

/// The processing strategy behind a [`Writable`].
///
/// Implement it on your own type to build a reusable sink; closures get
/// it for free through [`Writable::new`]. The sink is shared, not
/// borrowed, while it runs: a write may re-enter the same stage from its
/// callback, so mutable state belongs in a `Cell` or `RefCell`.
///
/// Failures must be reported through `done`, never by returning an error
/// of your own. Return whatever `done` returned so an unhandled `error`
/// event reaches the caller of `write`.
pub trait Sink {
    fn write(&self, chunk: Chunk, encoding: Option<Encoding>, done: Completion) -> Result<()>;
}

struct FnSink<F>(F);

impl<F> Sink for FnSink<F>
where
    F: Fn(Chunk, Option<Encoding>, Completion) -> Result<()>,
{
    fn write(&self, chunk: Chunk, encoding: Option<Encoding>, done: Completion) -> Result<()> {
        (self.0)(chunk, encoding, done)
    }
}

/// A terminal consumer.
///
/// Each write hands the chunk to the sink together with a completion
/// attributed to this stage. Success invokes the caller's callback;
/// failure invokes the callback with the error and emits `error` here.
/// `end` is the plain pass-through `end`.
pub struct Writable {
    core: Rc<StreamCore>,
    sink: Rc<dyn Sink>,
}

impl Writable {
    /// Creates a writable from a write function `(chunk, encoding, done)`.
    pub fn new<F>(write: F) -> Rc<Self>
    where
        F: Fn(Chunk, Option<Encoding>, Completion) -> Result<()> + 'static,
    {
        Self::with_sink(FnSink(write))
    }

    pub fn with_sink(sink: impl Sink + 'static) -> Rc<Self> {
        Rc::new(Self {
            core: StreamCore::new(),
            sink: Rc::new(sink),
        })
    }
}

impl Stage for Writable {
    fn core(&self) -> &Rc<StreamCore> {
        &self.core
    }

    fn write(
        &self,
        chunk: Chunk,
        encoding: Option<Encoding>,
        callback: Option<Callback>,
    ) -> Result<()> {
        let sink = self.sink.clone();
        let next: Next = Box::new(|_, callback| notify_success(callback));
        let done = Completion::tracked(&self.core, callback, Some(next));
        sink.write(chunk, encoding, done)
    }
}

impl fmt::Debug for Writable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writable").field("core", &self.core).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::stream::StageState;
    use std::cell::{Cell, RefCell};

    #[test]
    fn write_reaches_sink() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let writable = Writable::new(move |chunk, _, done| {
            s.borrow_mut().push(chunk.to_string());
            done.done()
        });

        writable.write_chunk("hello").unwrap();

        assert_eq!(*seen.borrow(), vec!["hello".to_string()]);
    }

    #[test]
    fn success_invokes_callback_once() {
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let writable = Writable::new(|_, _, done| done.done());

        writable
            .write(
                "x".into(),
                None,
                Some(Box::new(move |err| {
                    assert!(err.is_none());
                    c.set(c.get() + 1);
                    Ok(())
                })),
            )
            .unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(writable.state(), StageState::Idle);
    }

    #[test]
    fn failure_invokes_callback_and_emits() {
        let callback_err = Rc::new(RefCell::new(None));
        let event_err = Rc::new(RefCell::new(None));
        let writable = Writable::new(|_, _, done| done.fail(Error::operation("Fail!")));
        let e = event_err.clone();
        writable.on_error(move |err| *e.borrow_mut() = Some(err.to_string()));

        let c = callback_err.clone();
        writable
            .write(
                "x".into(),
                None,
                Some(Box::new(move |err| {
                    *c.borrow_mut() = err.map(|e| e.to_string());
                    Ok(())
                })),
            )
            .unwrap();

        assert_eq!(callback_err.borrow().as_deref(), Some("Error: Fail!"));
        assert_eq!(event_err.borrow().as_deref(), Some("Error: Fail!"));
        assert_eq!(writable.state(), StageState::Errored);
    }

    #[test]
    fn unhandled_failure_is_returned() {
        let writable = Writable::new(|_, _, done| done.fail(Error::operation("Fail!")));
        let err = writable.write_chunk("x").unwrap_err();
        assert_eq!(err.to_string(), "Error: Fail!");
    }

    struct Upper(Rc<RefCell<Vec<String>>>);

    impl Sink for Upper {
        fn write(&self, chunk: Chunk, _: Option<Encoding>, done: Completion) -> Result<()> {
            self.0.borrow_mut().push(chunk.to_string().to_uppercase());
            done.done()
        }
    }

    #[test]
    fn custom_sink_type() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let writable = Writable::with_sink(Upper(seen.clone()));
        writable.write_chunk("hello").unwrap();
        assert_eq!(*seen.borrow(), vec!["HELLO".to_string()]);
    }

    #[test]
    fn deferred_completion_tracks_overlap() {
        let pending: Rc<RefCell<Vec<Completion>>> = Rc::default();
        let p = pending.clone();
        let writable = Writable::new(move |_, _, done| {
            p.borrow_mut().push(done);
            Ok(())
        });

        writable.write_chunk("a").unwrap();
        writable.write_chunk("b").unwrap();
        assert_eq!(writable.in_flight(), 2);
        assert_eq!(writable.state(), StageState::Writing);

        // Complete out of order; the stage does not sequence them.
        let second = pending.borrow_mut().pop().unwrap();
        second.done().unwrap();
        assert_eq!(writable.in_flight(), 1);
        assert_eq!(writable.state(), StageState::Writing);

        let first = pending.borrow_mut().pop().unwrap();
        first.done().unwrap();
        assert_eq!(writable.in_flight(), 0);
        assert_eq!(writable.state(), StageState::Idle);
    }

    #[test]
    fn callback_may_write_next_chunk() {
        let written = Rc::new(RefCell::new(Vec::new()));
        let w = written.clone();
        let writable = Writable::new(move |chunk, _, done| {
            w.borrow_mut().push(chunk.to_string());
            done.done()
        });

        fn write_from(writable: &Rc<Writable>, rest: &'static [&'static str]) -> Result<()> {
            let Some((first, tail)) = rest.split_first() else {
                return Ok(());
            };
            let next = writable.clone();
            writable.write(
                (*first).into(),
                None,
                Some(Box::new(move |err| {
                    assert!(err.is_none());
                    write_from(&next, tail)
                })),
            )
        }

        write_from(&writable, &["a", "b", "c"]).unwrap();

        assert_eq!(*written.borrow(), vec!["a", "b", "c"]);
        assert_eq!(writable.state(), StageState::Idle);
        assert_eq!(writable.in_flight(), 0);
    }
}
