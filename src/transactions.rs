use std::net::SocketAddr;

use ahash::HashMap;
use rand::Rng;
use tokio::{sync::oneshot, time::Instant};

use crate::{Error, timer::TimerHandle};

pub type TransactionId = [u8; 12];

/// The caller suspended on an outstanding request, tagged with the
/// method the request was sent as.  Exactly one reply ever goes out:
/// either the matching response or a timeout.
pub enum Handler {
    Bind(oneshot::Sender<Result<SocketAddr, Error>>),
    Allocate(oneshot::Sender<Result<SocketAddr, Error>>),
    Refresh(oneshot::Sender<Result<(), Error>>),
    CreatePermission(oneshot::Sender<Result<(), Error>>),
}

pub struct Transaction {
    pub handler: Handler,
    /// fires a timeout event when the deadline passes; dropped, and with
    /// it cancelled, when the transaction is removed.
    pub deadline: TimerHandle,
    pub created_at: Instant,
}

/// Outstanding requests keyed by transaction id.
#[derive(Default)]
pub struct Transactions(HashMap<TransactionId, Transaction>);

impl Transactions {
    /// draw a fresh transaction id.
    ///
    /// ids come from the thread local CSPRNG; on the vanishingly rare
    /// collision with an in-flight id the generator is simply invoked
    /// again.
    pub fn generate_id(&self) -> TransactionId {
        let mut rng = rand::rng();
        let mut id = [0u8; 12];

        loop {
            rng.fill(&mut id);
            if !self.0.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn insert(&mut self, id: TransactionId, transaction: Transaction) {
        self.0.insert(id, transaction);
    }

    pub fn contains(&self, id: &[u8]) -> bool {
        TransactionId::try_from(id)
            .map(|id| self.0.contains_key(&id))
            .unwrap_or(false)
    }

    /// remove a transaction, cancelling its deadline timer.
    pub fn remove(&mut self, id: &[u8]) -> Option<Transaction> {
        let id = TransactionId::try_from(id).ok()?;
        self.0.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// reply to every pending caller that the session is gone.
    pub fn close(&mut self) {
        for (_, transaction) in self.0.drain() {
            match transaction.handler {
                Handler::Bind(tx) => drop(tx.send(Err(Error::Closed))),
                Handler::Allocate(tx) => drop(tx.send(Err(Error::Closed))),
                Handler::Refresh(tx) => drop(tx.send(Err(Error::Closed))),
                Handler::CreatePermission(tx) => drop(tx.send(Err(Error::Closed))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::sync::mpsc;

    use crate::timer::{self, Timer};

    #[tokio::test]
    async fn insert_lookup_remove() {
        let (queue, _queue_rx) = mpsc::channel(4);
        let mut transactions = Transactions::default();

        let id = transactions.generate_id();
        assert_ne!(id, transactions.generate_id());

        let (tx, mut rx) = oneshot::channel();
        let deadline = timer::schedule(queue, Duration::from_secs(5), Timer::Transaction { id });

        transactions.insert(
            id,
            Transaction {
                handler: Handler::Refresh(tx),
                deadline,
                created_at: Instant::now(),
            },
        );

        assert!(transactions.contains(&id));
        assert_eq!(transactions.len(), 1);

        let transaction = transactions.remove(&id).unwrap();
        assert!(transactions.is_empty());
        assert!(transactions.remove(&id).is_none());

        match transaction.handler {
            Handler::Refresh(tx) => drop(tx.send(Ok(()))),
            _ => panic!("wrong handler"),
        }

        assert!(rx.try_recv().unwrap().is_ok());
    }

    #[tokio::test]
    async fn close_replies_to_every_pending_caller() {
        let (queue, _queue_rx) = mpsc::channel(4);
        let mut transactions = Transactions::default();

        let id = transactions.generate_id();
        let (tx, mut rx) = oneshot::channel();
        let deadline =
            timer::schedule(queue, Duration::from_secs(5), Timer::Transaction { id });

        transactions.insert(
            id,
            Transaction {
                handler: Handler::Bind(tx),
                deadline,
                created_at: Instant::now(),
            },
        );

        transactions.close();

        assert!(transactions.is_empty());
        assert!(matches!(rx.try_recv().unwrap(), Err(Error::Closed)));
    }
}
