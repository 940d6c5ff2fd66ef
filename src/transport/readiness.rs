//! OS-backed readiness waiting for the event loops.
//!
//! Transports that wrap a socket expose it as a [`Source`]; the loops
//! register those with a [`Readiness`] and block in [`Readiness::wait`]
//! until one becomes readable, a [`Waker`] fires, or the timeout passes.
//! Sources are level-triggered, so a stream that still holds unread input
//! keeps reporting ready.

use std::{
    collections::HashMap,
    fmt,
    io,
    sync::Arc,
    time::Duration,
};

use polling::{Event, Events, PollMode, Poller};

/// Borrowed socket handle a transport hands to the poller.
#[cfg(unix)]
pub type Source<'a> = std::os::fd::BorrowedFd<'a>;

/// Borrowed socket handle a transport hands to the poller.
#[cfg(windows)]
pub type Source<'a> = std::os::windows::io::BorrowedSocket<'a>;

#[cfg(unix)]
pub(crate) fn source_of<T: std::os::fd::AsFd>(io: &T) -> Source<'_> { io.as_fd() }

#[cfg(windows)]
pub(crate) fn source_of<T: std::os::windows::io::AsSocket>(io: &T) -> Source<'_> { io.as_socket() }

/// Interrupts a blocked [`Readiness::wait`] from any thread.
#[derive(Clone, Debug)]
pub struct Waker(Arc<Poller>);

impl Waker {
    pub fn wake(&self) {
        if let Err(e) = self.0.notify() {
            log::debug!("readiness wake failed: {e}");
        }
    }
}

/// Registered sources and the poller watching them.
///
/// Every source added through [`Readiness::watch`] must be removed with
/// [`Readiness::forget`] before the stream that owns it is dropped.
pub struct Readiness {
    poller: Arc<Poller>,
    events: Events,
    interest: HashMap<usize, bool>,
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Readiness")
            .field("watched", &self.interest.len())
            .finish_non_exhaustive()
    }
}

impl Readiness {
    /// Create a poller.
    ///
    /// # Errors
    ///
    /// Fails when the OS refuses a new poller instance.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poller: Arc::new(Poller::new()?),
            events: Events::new(),
            interest: HashMap::new(),
        })
    }

    #[must_use]
    pub fn waker(&self) -> Waker { Waker(Arc::clone(&self.poller)) }

    /// Whether `key` is registered.
    #[must_use]
    pub fn is_watched(&self, key: usize) -> bool { self.interest.contains_key(&key) }

    /// Register `source` under `key`, or update its interest.
    ///
    /// With `readable` false the source stays registered but never reports.
    ///
    /// # Errors
    ///
    /// Propagates registration failures.
    pub fn watch(&mut self, key: usize, source: Source<'_>, readable: bool) -> io::Result<()> {
        let event = if readable { Event::readable(key) } else { Event::none(key) };
        match self.interest.get(&key) {
            Some(&current) if current == readable => return Ok(()),
            Some(_) => self.poller.modify_with_mode(source, event, PollMode::Level)?,
            // SAFETY: owners call `forget` before dropping the stream, so the
            // handle outlives its registration.
            None => unsafe { self.poller.add_with_mode(&source, event, PollMode::Level)? },
        }
        self.interest.insert(key, readable);
        Ok(())
    }

    /// Remove `key`'s registration. Unknown keys are ignored.
    pub fn forget(&mut self, key: usize, source: Source<'_>) {
        if self.interest.remove(&key).is_some()
            && let Err(e) = self.poller.delete(source)
        {
            log::debug!("readiness deregistration of {key} failed: {e}");
        }
    }

    /// Block until a registered source is ready, the [`Waker`] fires, or
    /// `timeout` passes. Returns the keys that reported ready.
    ///
    /// # Errors
    ///
    /// Propagates poller failures.
    pub fn wait(&mut self, timeout: Duration) -> io::Result<Vec<usize>> {
        self.events.clear();
        self.poller.wait(&mut self.events, Some(timeout))?;
        Ok(self.events.iter().map(|event| event.key).collect())
    }
}
