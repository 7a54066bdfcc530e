//! Deterministic reactor with a virtual clock.

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use super::traits::{Event, Interest, Reactor, TimerId, unknown_timer};
use crate::transport::Transport;

/// Reactor for tests: time only moves when a timer is fired.
///
/// Every registration and timer arming is recorded so tests can assert on
/// what the machine asked for.
#[derive(Debug, Default)]
pub struct ManualReactor {
    now: Duration,
    interest: Option<Interest>,
    timers: HashMap<TimerId, Option<Duration>>,
    registrations: Vec<Interest>,
    arms: Vec<(TimerId, Duration)>,
    created: usize,
    closed: usize,
}

impl ManualReactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed so far.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn interest(&self) -> Option<Interest> {
        self.interest
    }

    /// Every interest registered, in order.
    pub fn registrations(&self) -> &[Interest] {
        &self.registrations
    }

    /// Every `arm_timer` call with its delay, in order.
    pub fn arms(&self) -> &[(TimerId, Duration)] {
        &self.arms
    }

    pub fn created_timers(&self) -> usize {
        self.created
    }

    pub fn closed_timers(&self) -> usize {
        self.closed
    }

    /// Timers created and not yet closed.
    pub fn open_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        matches!(self.timers.get(&id), Some(Some(_)))
    }

    /// Jump the clock to the earliest armed timer and fire it.
    pub fn fire_next_timer(&mut self) -> Option<TimerId> {
        let (id, deadline) = self
            .timers
            .iter()
            .filter_map(|(id, deadline)| deadline.map(|d| (*id, d)))
            .min_by_key(|(_, d)| *d)?;
        self.now = self.now.max(deadline);
        self.timers.insert(id, None);
        Some(id)
    }

    /// Next event without sleeping.
    ///
    /// Readiness wins over timers. `None` when the machine is waiting on
    /// nothing that can ever happen.
    pub fn next_event<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Option<Event> {
        if let Some(interest) = self.interest
            && transport.poll_ready(interest).unwrap_or(true)
        {
            return Some(match interest {
                Interest::Readable => Event::Readable,
                Interest::Writable => Event::Writable,
            });
        }
        self.fire_next_timer().map(Event::TimerExpired)
    }
}

impl Reactor for ManualReactor {
    fn register(&mut self, interest: Interest) -> io::Result<()> {
        if self.interest.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "a watch is already registered",
            ));
        }
        self.interest = Some(interest);
        self.registrations.push(interest);
        Ok(())
    }

    fn deregister(&mut self) -> io::Result<()> {
        self.interest = None;
        Ok(())
    }

    fn create_timer(&mut self, id: TimerId) -> io::Result<()> {
        if self.timers.insert(id, None).is_none() {
            self.created += 1;
        }
        Ok(())
    }

    fn arm_timer(&mut self, id: TimerId, after: Duration) -> io::Result<()> {
        let now = self.now;
        let slot = self.timers.get_mut(&id).ok_or_else(|| unknown_timer(id))?;
        *slot = Some(now + after);
        self.arms.push((id, after));
        Ok(())
    }

    fn disarm_timer(&mut self, id: TimerId) -> io::Result<()> {
        let slot = self.timers.get_mut(&id).ok_or_else(|| unknown_timer(id))?;
        *slot = None;
        Ok(())
    }

    fn close_timer(&mut self, id: TimerId) {
        if self.timers.remove(&id).is_some() {
            self.closed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn test_fire_earliest_first() {
        let mut reactor = ManualReactor::new();
        reactor.create_timer(TimerId::Settle).unwrap();
        reactor.create_timer(TimerId::RequestTimeout).unwrap();
        reactor
            .arm_timer(TimerId::RequestTimeout, Duration::from_secs(5))
            .unwrap();
        reactor
            .arm_timer(TimerId::Settle, Duration::from_secs(1))
            .unwrap();

        assert_eq!(reactor.fire_next_timer(), Some(TimerId::Settle));
        assert_eq!(reactor.now(), Duration::from_secs(1));
        assert_eq!(reactor.fire_next_timer(), Some(TimerId::RequestTimeout));
        assert_eq!(reactor.now(), Duration::from_secs(5));
        assert_eq!(reactor.fire_next_timer(), None);
    }

    #[test]
    fn test_single_watch() {
        let mut reactor = ManualReactor::new();
        reactor.register(Interest::Readable).unwrap();
        assert!(reactor.register(Interest::Writable).is_err());
        reactor.deregister().unwrap();
        reactor.register(Interest::Writable).unwrap();
        assert_eq!(
            reactor.registrations(),
            &[Interest::Readable, Interest::Writable]
        );
    }

    #[test]
    fn test_readiness_before_timers() {
        let mut reactor = ManualReactor::new();
        let mut transport = MockTransport::new();
        reactor.create_timer(TimerId::RequestTimeout).unwrap();
        reactor
            .arm_timer(TimerId::RequestTimeout, Duration::from_secs(5))
            .unwrap();
        reactor.register(Interest::Readable).unwrap();

        assert_eq!(
            reactor.next_event(&mut transport),
            Some(Event::TimerExpired(TimerId::RequestTimeout))
        );

        reactor.arm_timer(TimerId::RequestTimeout, Duration::from_secs(5)).unwrap();
        transport.queue_rx(&[1]);
        assert_eq!(reactor.next_event(&mut transport), Some(Event::Readable));
    }

    #[test]
    fn test_open_close_accounting() {
        let mut reactor = ManualReactor::new();
        reactor.create_timer(TimerId::Settle).unwrap();
        reactor.create_timer(TimerId::PostValidate).unwrap();
        reactor.close_timer(TimerId::Settle);
        reactor.close_timer(TimerId::Settle);
        assert_eq!(reactor.created_timers(), 2);
        assert_eq!(reactor.closed_timers(), 1);
        assert_eq!(reactor.open_timers(), 1);
    }
}
