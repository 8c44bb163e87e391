//! Event names, payloads and the one-handler-per-event table.

use crate::chunk::Chunk;
use crate::error::{Error, Result};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// The events a stage emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// A chunk passed through the stage.
    Data,
    /// The stage was ended.
    End,
    /// A write, forward or flush failed.
    Error,
}

impl Event {
    const COUNT: usize = 3;

    fn slot(self) -> usize {
        match self {
            Event::Data => 0,
            Event::End => 1,
            Event::Error => 2,
        }
    }
}

/// An event together with its payload, as seen by a handler.
#[derive(Debug, Clone, Copy)]
pub enum Emission<'a> {
    Data(&'a Chunk),
    End,
    Error(&'a Error),
}

impl Emission<'_> {
    pub fn event(&self) -> Event {
        match self {
            Emission::Data(_) => Event::Data,
            Emission::End => Event::End,
            Emission::Error(_) => Event::Error,
        }
    }
}

/// A registered event handler.
pub type Handler = Box<dyn FnMut(&Emission<'_>)>;

type Slot = Rc<RefCell<Handler>>;

/// An emission held until the handler it targets is free again.
enum Queued {
    Data(Chunk),
    End,
    Error(Error),
}

impl Queued {
    fn from_emission(emission: &Emission<'_>) -> Self {
        match emission {
            Emission::Data(chunk) => Queued::Data((*chunk).clone()),
            Emission::End => Queued::End,
            Emission::Error(err) => Queued::Error((*err).clone()),
        }
    }

    fn as_emission(&self) -> Emission<'_> {
        match self {
            Queued::Data(chunk) => Emission::Data(chunk),
            Queued::End => Emission::End,
            Queued::Error(err) => Emission::Error(err),
        }
    }
}

/// Holds at most one handler per [`Event`].
///
/// Escalation contract: emitting [`Emission::Error`] with no handler
/// registered returns the error value as `Err`. Every other unhandled
/// emission is a no-op.
///
/// Handlers stay registered while they run. A handler may replace
/// handlers on the same table, and may trigger further emissions: those
/// aimed at a different handler run immediately, those aimed at the
/// handler already running are delivered in order right after it
/// returns.
#[derive(Default)]
pub struct Listeners {
    slots: RefCell<[Option<Slot>; Event::COUNT]>,
    pending: RefCell<[VecDeque<Queued>; Event::COUNT]>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event`, replacing any previous one.
    pub fn set(&self, event: Event, handler: Handler) {
        self.slots.borrow_mut()[event.slot()] = Some(Rc::new(RefCell::new(handler)));
    }

    pub fn has_handler(&self, event: Event) -> bool {
        self.slots.borrow()[event.slot()].is_some()
    }

    /// Invokes the handler for `emission` synchronously.
    pub fn emit(&self, emission: Emission<'_>) -> Result<()> {
        let slot = emission.event().slot();
        let handler = self.slots.borrow()[slot].clone();
        let Some(handler) = handler else {
            return match emission {
                Emission::Error(err) => {
                    tracing::warn!(error = %err, "unhandled error event");
                    Err(err.clone())
                }
                _ => Ok(()),
            };
        };

        let Ok(mut running) = handler.try_borrow_mut() else {
            tracing::trace!(event = ?emission.event(), "handler busy, queueing emission");
            self.pending.borrow_mut()[slot].push_back(Queued::from_emission(&emission));
            return Ok(());
        };
        (&mut **running)(&emission);
        drop(running);

        loop {
            let next = self.pending.borrow_mut()[slot].pop_front();
            match next {
                Some(queued) => self.emit(queued.as_emission())?,
                None => return Ok(()),
            }
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("data", &self.has_handler(Event::Data))
            .field("end", &self.has_handler(Event::End))
            .field("error", &self.has_handler(Event::Error))
            .finish()
    }
}
