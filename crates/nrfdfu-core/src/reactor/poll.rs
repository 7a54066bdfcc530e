//! Blocking reactor that polls transport readiness and timer deadlines.

use std::collections::HashMap;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use super::traits::{Event, Interest, Reactor, TimerId, unknown_timer};
use crate::transport::Transport;

pub const DEFAULT_POLL_TICK: Duration = Duration::from_millis(5);

/// Single-threaded driver for real hardware.
///
/// [`PollReactor::next_event`] sleeps in short ticks until the registered
/// interest is satisfied or a timer expires.
#[derive(Debug)]
pub struct PollReactor {
    interest: Option<Interest>,
    /// Created timers and their deadlines when armed.
    timers: HashMap<TimerId, Option<Instant>>,
    tick: Duration,
}

impl Default for PollReactor {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_TICK)
    }
}

impl PollReactor {
    pub fn new(tick: Duration) -> Self {
        Self {
            interest: None,
            timers: HashMap::new(),
            tick,
        }
    }

    pub fn interest(&self) -> Option<Interest> {
        self.interest
    }

    fn earliest_deadline(&self) -> Option<(TimerId, Instant)> {
        self.timers
            .iter()
            .filter_map(|(id, deadline)| deadline.map(|d| (*id, d)))
            .min_by_key(|(_, d)| *d)
    }

    /// Wait for the next event.
    ///
    /// Returns `None` when nothing is registered and no timer is armed, so
    /// no event can ever arrive. A transport error while polling is
    /// reported as readiness; the following read or write surfaces it.
    pub fn next_event<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> io::Result<Option<Event>> {
        loop {
            if let Some(interest) = self.interest {
                let ready = transport.poll_ready(interest).unwrap_or(true);
                if ready {
                    trace!(?interest, "Transport ready");
                    return Ok(Some(match interest {
                        Interest::Readable => Event::Readable,
                        Interest::Writable => Event::Writable,
                    }));
                }
            }

            let now = Instant::now();
            let next = self.earliest_deadline();
            match next {
                Some((id, deadline)) if deadline <= now => {
                    self.timers.insert(id, None);
                    trace!(timer = %id, "Timer expired");
                    return Ok(Some(Event::TimerExpired(id)));
                }
                Some((_, deadline)) => {
                    thread::sleep(self.tick.min(deadline - now));
                }
                None if self.interest.is_some() => thread::sleep(self.tick),
                None => return Ok(None),
            }
        }
    }
}

impl Reactor for PollReactor {
    fn register(&mut self, interest: Interest) -> io::Result<()> {
        self.interest = Some(interest);
        Ok(())
    }

    fn deregister(&mut self) -> io::Result<()> {
        self.interest = None;
        Ok(())
    }

    fn create_timer(&mut self, id: TimerId) -> io::Result<()> {
        self.timers.insert(id, None);
        Ok(())
    }

    fn arm_timer(&mut self, id: TimerId, after: Duration) -> io::Result<()> {
        let slot = self.timers.get_mut(&id).ok_or_else(|| unknown_timer(id))?;
        *slot = Some(Instant::now() + after);
        Ok(())
    }

    fn disarm_timer(&mut self, id: TimerId) -> io::Result<()> {
        let slot = self.timers.get_mut(&id).ok_or_else(|| unknown_timer(id))?;
        *slot = None;
        Ok(())
    }

    fn close_timer(&mut self, id: TimerId) {
        self.timers.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn test_idle_reactor_returns_none() {
        let mut reactor = PollReactor::default();
        let mut transport = MockTransport::new();
        assert_eq!(reactor.next_event(&mut transport).unwrap(), None);
    }

    #[test]
    fn test_readable_when_bytes_queued() {
        let mut reactor = PollReactor::default();
        let mut transport = MockTransport::new();
        transport.queue_rx(&[0xC0]);
        reactor.register(Interest::Readable).unwrap();
        assert_eq!(
            reactor.next_event(&mut transport).unwrap(),
            Some(Event::Readable)
        );
    }

    #[test]
    fn test_timer_fires_once() {
        let mut reactor = PollReactor::new(Duration::from_millis(1));
        let mut transport = MockTransport::new();
        reactor.create_timer(TimerId::Settle).unwrap();
        reactor
            .arm_timer(TimerId::Settle, Duration::from_millis(2))
            .unwrap();

        assert_eq!(
            reactor.next_event(&mut transport).unwrap(),
            Some(Event::TimerExpired(TimerId::Settle))
        );
        assert_eq!(reactor.next_event(&mut transport).unwrap(), None);
    }

    #[test]
    fn test_arm_requires_create() {
        let mut reactor = PollReactor::default();
        assert!(
            reactor
                .arm_timer(TimerId::PostValidate, Duration::from_secs(1))
                .is_err()
        );
        reactor.create_timer(TimerId::PostValidate).unwrap();
        reactor.close_timer(TimerId::PostValidate);
        assert!(reactor.disarm_timer(TimerId::PostValidate).is_err());
    }
}
