//! Call deadlines.

use std::io::{self, Read};
use std::time::{Duration, Instant};

use super::connection::Transport;

/// Point in time after which a call gives up.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    expires: Option<Instant>,
}

impl Deadline {
    /// A deadline `budget` from now. Budgets too large to represent never expire.
    pub(crate) fn after(budget: Duration) -> Self {
        Self {
            expires: Instant::now().checked_add(budget),
        }
    }

    /// Time left, or `None` when the deadline never expires.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.expires
            .map(|expires| expires.saturating_duration_since(Instant::now()))
    }

    /// Whether waiting `wait` more would still finish before the deadline.
    pub(crate) fn allows(&self, wait: Duration) -> bool {
        self.remaining().is_none_or(|remaining| remaining >= wait)
    }

    /// Timeout for one connection attempt: the time left, capped at `cap`.
    ///
    /// `None` once the deadline has passed.
    pub(crate) fn connect_timeout(&self, cap: Duration) -> Option<Duration> {
        match self.remaining() {
            Some(remaining) if remaining.is_zero() => None,
            Some(remaining) => Some(remaining.min(cap)),
            None => Some(cap),
        }
    }

    /// Timeout to install on a socket before the next blocking operation.
    ///
    /// Fails with [`io::ErrorKind::TimedOut`] once the deadline has passed, as
    /// sockets reject a zero timeout.
    pub(crate) fn socket_timeout(&self) -> io::Result<Option<Duration>> {
        match self.remaining() {
            Some(remaining) if remaining.is_zero() => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "call deadline elapsed",
            )),
            remaining => Ok(remaining),
        }
    }
}

/// Reads from a transport, shrinking the read timeout to the time left.
pub(crate) struct DeadlineReader<'a, T: Transport> {
    stream: &'a mut T,
    deadline: Deadline,
}

impl<'a, T: Transport> DeadlineReader<'a, T> {
    pub(crate) const fn new(stream: &'a mut T, deadline: Deadline) -> Self {
        Self { stream, deadline }
    }
}

impl<T: Transport> Read for DeadlineReader<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.deadline.socket_timeout()?;
        self.stream.set_read_timeout(timeout)?;
        self.stream.read(buf)
    }
}
