use std::{net::IpAddr, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle, time::sleep};

use crate::session::Event;

/// A timer event, delivered through the session queue like everything
/// else so that it never observes half-applied state.
///
/// Allocation and permission timers carry the sequence number they were
/// armed with.  Re-arming bumps the sequence, so a fire that was already
/// in flight when the timer was replaced identifies itself as stale and
/// is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// the allocation lifetime ran out.
    Allocation { seq: u64 },
    /// a permission's five minute window ran out.
    Permission { peer: IpAddr, seq: u64 },
    /// an outstanding transaction hit its deadline.
    Transaction { id: [u8; 12] },
}

/// A cancellable handle to a scheduled timer.
///
/// Dropping the handle cancels the timer, which keeps the state
/// invariants simple: whoever owns the guarded state owns the timer.
pub struct TimerHandle(JoinHandle<()>);

impl TimerHandle {
    pub fn cancel(&self) {
        self.0.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// schedule a timer event onto the session queue.
pub fn schedule(queue: mpsc::Sender<Event>, after: Duration, timer: Timer) -> TimerHandle {
    TimerHandle(tokio::spawn(async move {
        sleep(after).await;
        let _ = queue.send(Event::Timer(timer)).await;
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_through_the_queue() {
        let (tx, mut rx) = mpsc::channel(4);
        let _handle = schedule(tx, Duration::from_secs(30), Timer::Allocation { seq: 1 });

        match rx.recv().await {
            Some(Event::Timer(timer)) => assert_eq!(timer, Timer::Allocation { seq: 1 }),
            _ => panic!("expected a timer event"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_by_drop() {
        let (tx, mut rx) = mpsc::channel(4);
        drop(schedule(tx, Duration::from_millis(10), Timer::Allocation { seq: 1 }));

        sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
