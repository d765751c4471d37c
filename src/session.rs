use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use codec::{
    Attributes,
    message::{
        Message, MessageEncoder,
        attributes::{
            Data, ErrorCodeAttr, Lifetime, MessageIntegrity, Nonce, Realm, RequestedTransport,
            Transport, UserName, XorMappedAddress, XorPeerAddress, XorRelayedAddress,
            error::ErrorKind,
        },
        methods::{
            ALLOCATE_REQUEST, BINDING_INDICATION, BINDING_REQUEST, CREATE_PERMISSION_REQUEST,
            DATA_INDICATION, Method, MethodType, REFRESH_REQUEST, SEND_INDICATION,
        },
    },
};
use serde::Deserialize;
use tokio::{
    net::UdpSocket,
    sync::{mpsc, oneshot},
    time::Instant,
};

use crate::{
    Error,
    credentials::Credentials,
    relay::Relay,
    subscriptions::{Subscriber, Subscriptions},
    timer::{self, Timer, TimerHandle},
    transactions::{Handler, Transaction, TransactionId, Transactions},
};

/// permission lifetime, fixed by the protocol at five minutes.
const PERMISSION_LIFETIME: Duration = Duration::from_secs(300);

/// Session configuration.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct SessionOptions {
    ///
    /// stun/turn server address
    ///
    /// the session speaks to this one server; datagrams from anywhere
    /// else are dropped.
    ///
    pub server: SocketAddr,
    ///
    /// credential user identifier
    ///
    /// optional, required for authenticated operations.
    ///
    #[serde(default)]
    pub username: Option<String>,
    ///
    /// long term secret
    ///
    #[serde(default)]
    pub secret: Option<String>,
    ///
    /// per transaction deadline in milliseconds
    ///
    #[serde(default = "SessionOptions::timeout")]
    pub timeout: u64,
}

impl SessionOptions {
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            username: None,
            secret: None,
            timeout: Self::timeout(),
        }
    }

    fn timeout() -> u64 {
        5000
    }
}

/// An operation suspending the caller until the session settles it.
pub enum Call {
    Bind(oneshot::Sender<Result<SocketAddr, Error>>),
    Allocate(oneshot::Sender<Result<SocketAddr, Error>>),
    Refresh(oneshot::Sender<Result<(), Error>>),
    CreatePermission(Vec<IpAddr>, oneshot::Sender<Result<(), Error>>),
    Send(SocketAddr, Bytes, oneshot::Sender<Result<(), Error>>),
    Subscribe(IpAddr, Subscriber, oneshot::Sender<()>),
    Unsubscribe(IpAddr, u64, oneshot::Sender<()>),
}

/// A fire and forget operation.
pub enum Cast {
    Persist,
}

/// Everything the session loop reacts to, serialized through one queue.
/// Inbound datagrams join at the same point from the socket itself.
pub enum Event {
    Call(Call),
    Cast(Cast),
    Timer(Timer),
    SubscriberDown(u64),
}

/// Handle to a running session.
///
/// Cheap to clone; the session terminates once every handle is gone or
/// the socket fails, whichever comes first.
#[derive(Clone)]
pub struct Session {
    queue: mpsc::Sender<Event>,
}

impl Session {
    /// open the socket and start the session loop.
    ///
    /// the socket is bound to a system allocated port on the unspecified
    /// address of the server's family.
    pub async fn connect(options: SessionOptions) -> Result<Self, Error> {
        let bind: SocketAddr = if options.server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = Arc::new(UdpSocket::bind(bind).await?);
        let (queue_tx, queue_rx) = mpsc::channel(64);

        let actor = SessionActor {
            server: options.server,
            timeout: Duration::from_millis(options.timeout),
            credentials: Credentials::initial(options.username, options.secret),
            queue: queue_tx.clone(),
            socket,
            transactions: Transactions::default(),
            relay: Relay::default(),
            subscriptions: Subscriptions::default(),
            timer_seq: 0,
            buf: BytesMut::with_capacity(1500),
        };

        tokio::spawn(actor.run(queue_rx));

        Ok(Self { queue: queue_tx })
    }

    /// discover the reflexive candidate.
    pub async fn bind(&self) -> Result<SocketAddr, Error> {
        let (tx, rx) = oneshot::channel();
        self.call(Call::Bind(tx)).await?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// keep the NAT binding towards the server alive.
    ///
    /// a binding indication, no response is expected or awaited.
    pub async fn persist(&self) -> Result<(), Error> {
        self.queue
            .send(Event::Cast(Cast::Persist))
            .await
            .map_err(|_| Error::Closed)
    }

    /// obtain a relayed transport address.
    ///
    /// with an allocation already present the stored relayed address is
    /// returned immediately without network traffic.
    pub async fn allocate(&self) -> Result<SocketAddr, Error> {
        let (tx, rx) = oneshot::channel();
        self.call(Call::Allocate(tx)).await?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// refresh the allocation lifetime.
    pub async fn refresh(&self) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.call(Call::Refresh(tx)).await?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// install permissions for the given peer IPs.
    pub async fn create_permission(&self, peers: &[IpAddr]) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.call(Call::CreatePermission(peers.to_vec(), tx)).await?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// send data to a peer through the allocation.
    ///
    /// requires an acked permission for the peer's IP.
    pub async fn send(&self, peer: SocketAddr, data: Bytes) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.call(Call::Send(peer, data, tx)).await?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// register a subscriber for data indications from a peer IP.
    pub async fn subscribe(&self, subscriber: &Subscriber, peer: IpAddr) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.call(Call::Subscribe(peer, subscriber.clone(), tx)).await?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// remove a (subscriber, peer) registration; absent pairs are a no-op.
    pub async fn unsubscribe(&self, subscriber: &Subscriber, peer: IpAddr) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.call(Call::Unsubscribe(peer, subscriber.id(), tx)).await?;
        rx.await.map_err(|_| Error::Closed)
    }

    async fn call(&self, call: Call) -> Result<(), Error> {
        self.queue
            .send(Event::Call(call))
            .await
            .map_err(|_| Error::Closed)
    }
}

struct SessionActor {
    server: SocketAddr,
    timeout: Duration,
    socket: Arc<UdpSocket>,
    queue: mpsc::Sender<Event>,
    credentials: Credentials,
    transactions: Transactions,
    relay: Relay,
    subscriptions: Subscriptions,
    timer_seq: u64,
    buf: BytesMut,
}

impl SessionActor {
    async fn run(mut self, mut queue: mpsc::Receiver<Event>) {
        let socket = self.socket.clone();
        let mut buf = [0u8; 2048];

        loop {
            tokio::select! {
                event = queue.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    // every handle is gone.
                    None => break,
                },
                result = socket.recv_from(&mut buf) => match result {
                    Ok((size, from)) => self.handle_datagram(&buf[..size], from),
                    Err(err) => {
                        log::error!("session socket failed: {err}");
                        break;
                    }
                },
            }
        }

        self.transactions.close();
        log::debug!("session terminated");
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Call(call) => self.handle_call(call).await,
            Event::Cast(cast) => self.handle_cast(cast).await,
            Event::Timer(timer) => self.handle_timer(timer),
            Event::SubscriberDown(id) => {
                log::debug!("subscriber {id} went away");
                self.subscriptions.remove_subscriber(id);
            }
        }
    }

    async fn handle_call(&mut self, call: Call) {
        match call {
            Call::Bind(tx) => {
                let id = self.transactions.generate_id();
                match self.transmit(BINDING_REQUEST, &id, false, |_| {}).await {
                    Ok(()) => self.insert_transaction(id, Handler::Bind(tx)),
                    Err(err) => drop(tx.send(Err(err))),
                }
            }
            Call::Allocate(tx) => {
                // an allocation already present short-circuits, no packet
                // is emitted.
                if let Some(relayed) = self.relay.relayed {
                    let _ = tx.send(Ok(relayed));
                    return;
                }

                let id = self.transactions.generate_id();
                let result = self
                    .transmit(ALLOCATE_REQUEST, &id, true, |message| {
                        message.append::<RequestedTransport>(Transport::Udp);
                    })
                    .await;

                match result {
                    Ok(()) => self.insert_transaction(id, Handler::Allocate(tx)),
                    Err(err) => drop(tx.send(Err(err))),
                }
            }
            Call::Refresh(tx) => {
                if !self.relay.is_allocated() {
                    let _ = tx.send(Err(Error::NoAllocation));
                    return;
                }

                let id = self.transactions.generate_id();
                match self.transmit(REFRESH_REQUEST, &id, true, |_| {}).await {
                    Ok(()) => self.insert_transaction(id, Handler::Refresh(tx)),
                    Err(err) => drop(tx.send(Err(err))),
                }
            }
            Call::CreatePermission(peers, tx) => {
                if !self.relay.is_allocated() {
                    let _ = tx.send(Err(Error::NoAllocation));
                    return;
                }

                if peers.is_empty() {
                    let _ = tx.send(Ok(()));
                    return;
                }

                let id = self.transactions.generate_id();
                let result = self
                    .transmit(CREATE_PERMISSION_REQUEST, &id, true, |message| {
                        // the port of a peer address is ignored by the
                        // server, a permission covers the whole IP.
                        for peer in &peers {
                            message.append::<XorPeerAddress>(SocketAddr::new(*peer, 0));
                        }
                    })
                    .await;

                match result {
                    Ok(()) => {
                        for peer in peers {
                            self.relay.install_unacked(peer, id);
                        }

                        self.insert_transaction(id, Handler::CreatePermission(tx));
                    }
                    Err(err) => drop(tx.send(Err(err))),
                }
            }
            Call::Send(peer, data, tx) => {
                if !self.relay.is_allocated() {
                    let _ = tx.send(Err(Error::NoAllocation));
                    return;
                }

                if !self.relay.can_send(peer.ip()) {
                    let _ = tx.send(Err(Error::NoPermission));
                    return;
                }

                let id = self.transactions.generate_id();
                let result = self
                    .transmit(SEND_INDICATION, &id, false, |message| {
                        message.append::<XorPeerAddress>(peer);
                        message.append::<Data>(&data[..]);
                    })
                    .await;

                let _ = tx.send(result);
            }
            Call::Subscribe(peer, subscriber, tx) => {
                self.subscriptions.subscribe(peer, subscriber, self.queue.clone());
                let _ = tx.send(());
            }
            Call::Unsubscribe(peer, id, tx) => {
                self.subscriptions.unsubscribe(peer, id);
                let _ = tx.send(());
            }
        }
    }

    async fn handle_cast(&mut self, cast: Cast) {
        match cast {
            Cast::Persist => {
                let id = self.transactions.generate_id();
                if let Err(err) = self.transmit(BINDING_INDICATION, &id, false, |_| {}).await {
                    log::debug!("persist indication failed: {err}");
                }
            }
        }
    }

    fn handle_timer(&mut self, timer: Timer) {
        match timer {
            Timer::Transaction { id } => {
                if let Some(transaction) = self.transactions.remove(&id) {
                    log::debug!(
                        "transaction {:02x?} timed out after {:?}",
                        id,
                        transaction.created_at.elapsed()
                    );

                    match transaction.handler {
                        Handler::Bind(tx) => drop(tx.send(Err(Error::Timeout))),
                        Handler::Allocate(tx) => drop(tx.send(Err(Error::Timeout))),
                        Handler::Refresh(tx) => drop(tx.send(Err(Error::Timeout))),
                        Handler::CreatePermission(tx) => drop(tx.send(Err(Error::Timeout))),
                    }
                }
            }
            Timer::Allocation { seq } => {
                if self.relay.timer.as_ref().map(|(s, _)| *s) == Some(seq) {
                    log::debug!("allocation lifetime expired");
                    self.relay.clear();
                }
            }
            Timer::Permission { peer, seq } => self.relay.expire_permission(peer, seq),
        }
    }

    fn handle_datagram(&mut self, bytes: &[u8], from: SocketAddr) {
        // only the configured server is listened to.
        if from != self.server {
            log::debug!("dropping datagram from foreign source {from}");
            return;
        }

        let mut attributes = Attributes::default();
        let message = match Message::decode(bytes, &mut attributes) {
            Ok(message) => message,
            Err(err) => {
                log::debug!("dropping undecodable datagram: {err}");
                return;
            }
        };

        if message.method() == DATA_INDICATION {
            let (Some(peer), Some(data)) = (message.get::<XorPeerAddress>(), message.get::<Data>())
            else {
                log::debug!("dropping data indication without peer address or data");
                return;
            };

            self.subscriptions.dispatch(peer, data);
            return;
        }

        if !message.method().is_response() {
            log::debug!("dropping unexpected {:?} from server", message.method());
            return;
        }

        let Ok(token) = TransactionId::try_from(message.token()) else {
            return;
        };

        if !self.transactions.contains(&token) {
            log::debug!("dropping response with no matching transaction");
            return;
        }

        // verify the integrity when the message is signed and a key is
        // derivable; a mismatch drops the datagram and lets the
        // transaction run into its deadline.
        if message.get::<MessageIntegrity>().is_some()
            && let Some(key) = self.credentials.key()
            && let Err(err) = message.verify(&key)
        {
            log::warn!("dropping response failing the integrity check: {err}");
            return;
        }

        let Some(transaction) = self.transactions.remove(&token) else {
            return;
        };

        match transaction.handler {
            Handler::Bind(tx) => drop(tx.send(self.on_bind_response(&message))),
            Handler::Allocate(tx) => drop(tx.send(self.on_allocate_response(&message))),
            Handler::Refresh(tx) => drop(tx.send(self.on_refresh_response(&message))),
            Handler::CreatePermission(tx) => {
                drop(tx.send(self.on_create_permission_response(&message, token)))
            }
        }
    }

    fn on_bind_response(&mut self, message: &Message) -> Result<SocketAddr, Error> {
        match message.method() {
            Method::Binding(MethodType::Response) => message
                .get::<XorMappedAddress>()
                .ok_or(Error::BadResponse("xor-mapped-address")),
            Method::Binding(MethodType::Error) => Err(self.failure(message)),
            _ => Err(Error::BadResponse("method")),
        }
    }

    fn on_allocate_response(&mut self, message: &Message) -> Result<SocketAddr, Error> {
        match message.method() {
            Method::Allocate(MethodType::Response) => {
                let relayed = message
                    .get::<XorRelayedAddress>()
                    .ok_or(Error::BadResponse("xor-relayed-address"))?;
                let lifetime = message
                    .get::<Lifetime>()
                    .ok_or(Error::BadResponse("lifetime"))?;

                let timer = self.arm_allocation_timer(lifetime);
                self.relay.on_allocated(relayed, lifetime, timer);

                log::info!("allocation ready, relayed address {relayed}, lifetime {lifetime}s");
                Ok(relayed)
            }
            Method::Allocate(MethodType::Error) => Err(self.failure(message)),
            _ => Err(Error::BadResponse("method")),
        }
    }

    fn on_refresh_response(&mut self, message: &Message) -> Result<(), Error> {
        match message.method() {
            Method::Refresh(MethodType::Response) => {
                let lifetime = message
                    .get::<Lifetime>()
                    .ok_or(Error::BadResponse("lifetime"))?;

                // a zero lifetime releases the allocation exactly like an
                // expiry, otherwise the lifetime timer is re-armed.
                if lifetime == 0 {
                    log::debug!("allocation released");
                    self.relay.clear();
                } else if let Some(relayed) = self.relay.relayed {
                    let timer = self.arm_allocation_timer(lifetime);
                    self.relay.on_allocated(relayed, lifetime, timer);
                }

                Ok(())
            }
            Method::Refresh(MethodType::Error) => Err(self.failure(message)),
            _ => Err(Error::BadResponse("method")),
        }
    }

    fn on_create_permission_response(
        &mut self,
        message: &Message,
        id: TransactionId,
    ) -> Result<(), Error> {
        match message.method() {
            Method::CreatePermission(MethodType::Response) => {
                for peer in self.relay.installed_by(&id) {
                    self.timer_seq += 1;
                    let timer = timer::schedule(
                        self.queue.clone(),
                        PERMISSION_LIFETIME,
                        Timer::Permission {
                            peer,
                            seq: self.timer_seq,
                        },
                    );

                    if let Some(permission) = self.relay.permissions.get_mut(&peer) {
                        permission.acked = true;
                        // replacing the handle cancels any previous timer.
                        permission.timer = Some((self.timer_seq, timer));
                    }
                }

                Ok(())
            }
            Method::CreatePermission(MethodType::Error) => Err(self.failure(message)),
            _ => Err(Error::BadResponse("method")),
        }
    }

    /// interpret an error response.
    ///
    /// a 401 or 438 carrying realm and nonce promotes the credentials,
    /// the caller observes the error and retries with the promoted
    /// credentials signing the message.
    fn failure(&mut self, message: &Message) -> Error {
        let Some(error) = message.get::<ErrorCodeAttr>() else {
            return Error::BadResponse("error-code");
        };

        match ErrorKind::try_from(error.code) {
            Ok(ErrorKind::Unauthorized) => {
                self.promote(message);
                Error::Unauthorized
            }
            Ok(ErrorKind::StaleNonce) => {
                self.promote(message);
                Error::StaleNonce
            }
            _ => Error::Server {
                code: error.code,
                reason: error.reason.to_string(),
            },
        }
    }

    fn promote(&mut self, message: &Message) {
        let (Some(realm), Some(nonce)) = (message.get::<Realm>(), message.get::<Nonce>()) else {
            log::warn!("authentication challenge without realm or nonce");
            return;
        };

        match self.credentials.promote(realm, nonce) {
            Some(credentials) => self.credentials = credentials,
            None => log::warn!("challenged but no credentials are configured"),
        }
    }

    /// build one message and push it to the server.
    ///
    /// when signing is requested and the credentials are final, the
    /// username, realm and nonce attributes are appended and the message
    /// integrity is computed with the long term key.
    async fn transmit(
        &mut self,
        method: Method,
        id: &TransactionId,
        sign: bool,
        append: impl FnOnce(&mut MessageEncoder),
    ) -> Result<(), Error> {
        let key = if sign { self.credentials.key() } else { None };

        {
            let mut message = MessageEncoder::new(method, id, &mut self.buf);
            append(&mut message);

            if key.is_some()
                && let Credentials::Final {
                    username,
                    realm,
                    nonce,
                    ..
                } = &self.credentials
            {
                message.append::<UserName>(username.as_str());
                message.append::<Realm>(realm.as_str());
                message.append::<Nonce>(nonce.as_str());
            }

            message.flush(key.as_ref())?;
        }

        self.socket.send_to(&self.buf, self.server).await?;
        Ok(())
    }

    fn insert_transaction(&mut self, id: TransactionId, handler: Handler) {
        let deadline = timer::schedule(self.queue.clone(), self.timeout, Timer::Transaction { id });

        self.transactions.insert(
            id,
            Transaction {
                handler,
                deadline,
                created_at: Instant::now(),
            },
        );
    }

    fn arm_allocation_timer(&mut self, lifetime: u32) -> (u64, TimerHandle) {
        self.timer_seq += 1;
        (
            self.timer_seq,
            timer::schedule(
                self.queue.clone(),
                Duration::from_secs(lifetime as u64),
                Timer::Allocation {
                    seq: self.timer_seq,
                },
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn actor() -> (SessionActor, mpsc::Receiver<Event>) {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let server = socket.local_addr().unwrap();
        let (queue_tx, queue_rx) = mpsc::channel(16);

        (
            SessionActor {
                server,
                timeout: Duration::from_millis(5000),
                credentials: Credentials::None,
                queue: queue_tx,
                socket,
                transactions: Transactions::default(),
                relay: Relay::default(),
                subscriptions: Subscriptions::default(),
                timer_seq: 0,
                buf: BytesMut::with_capacity(1500),
            },
            queue_rx,
        )
    }

    fn ack_permission(actor: &mut SessionActor, peer: IpAddr) {
        actor.relay.install_unacked(peer, [1u8; 12]);
        actor.timer_seq += 1;

        let handle = timer::schedule(
            actor.queue.clone(),
            PERMISSION_LIFETIME,
            Timer::Permission {
                peer,
                seq: actor.timer_seq,
            },
        );

        let permission = actor.relay.permissions.get_mut(&peer).unwrap();
        permission.acked = true;
        permission.timer = Some((actor.timer_seq, handle));
    }

    #[tokio::test(start_paused = true)]
    async fn allocation_expiry_cancels_permissions() {
        let (mut actor, mut queue) = actor().await;

        let timer = actor.arm_allocation_timer(30);
        actor
            .relay
            .on_allocated("198.51.100.7:49160".parse().unwrap(), 30, timer);

        let peer: IpAddr = "203.0.113.4".parse().unwrap();
        ack_permission(&mut actor, peer);
        assert!(actor.relay.can_send(peer));

        // thirty simulated seconds later the lifetime timer fires, well
        // before the five minute permission timer.
        let Some(Event::Timer(timer)) = queue.recv().await else {
            panic!("expected a timer event");
        };
        assert_eq!(timer, Timer::Allocation { seq: 1 });

        actor.handle_timer(timer);

        assert!(!actor.relay.is_allocated());
        assert!(actor.relay.permissions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_allocation_timer_is_ignored() {
        let (mut actor, _queue) = actor().await;

        let timer = actor.arm_allocation_timer(30);
        actor
            .relay
            .on_allocated("198.51.100.7:49160".parse().unwrap(), 30, timer);

        // a refresh re-armed the timer; the old fire crosses the queue
        // anyway and has to be ignored.
        let timer = actor.arm_allocation_timer(600);
        actor
            .relay
            .on_allocated("198.51.100.7:49160".parse().unwrap(), 600, timer);

        actor.handle_timer(Timer::Allocation { seq: 1 });
        assert!(actor.relay.is_allocated());

        actor.handle_timer(Timer::Allocation { seq: 2 });
        assert!(!actor.relay.is_allocated());
    }

    #[tokio::test(start_paused = true)]
    async fn permission_expiry_is_silent_and_local() {
        let (mut actor, mut queue) = actor().await;

        let timer = actor.arm_allocation_timer(3600);
        actor
            .relay
            .on_allocated("198.51.100.7:49160".parse().unwrap(), 3600, timer);

        let peer: IpAddr = "203.0.113.4".parse().unwrap();
        ack_permission(&mut actor, peer);

        // five simulated minutes later the permission goes away but the
        // allocation stays.
        let Some(Event::Timer(timer)) = queue.recv().await else {
            panic!("expected a timer event");
        };
        assert_eq!(
            timer,
            Timer::Permission {
                peer,
                seq: actor.timer_seq
            }
        );

        actor.handle_timer(timer);

        assert!(!actor.relay.can_send(peer));
        assert!(actor.relay.is_allocated());
    }
}
