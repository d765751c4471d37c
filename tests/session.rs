use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use bytes::{Bytes, BytesMut};
use tokio::{net::UdpSocket, sync::Mutex, time::sleep};
use turn_client::{
    Error, InboundData, Session, SessionOptions, Subscriber,
    codec::{
        Attributes,
        crypto::Key,
        message::{
            Message, MessageEncoder,
            attributes::{
                Data, ErrorCodeAttr, Lifetime, Nonce, Realm, UserName, XorMappedAddress,
                XorPeerAddress, XorRelayedAddress,
                error::{ErrorCode, ErrorKind},
            },
            methods::*,
        },
    },
};

struct TestServer {
    socket: UdpSocket,
}

impl TestServer {
    async fn bind() -> Result<Self> {
        Ok(Self {
            socket: UdpSocket::bind("127.0.0.1:0").await?,
        })
    }

    fn address(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    async fn recv(&self, buf: &mut [u8]) -> (usize, SocketAddr) {
        self.socket.recv_from(buf).await.unwrap()
    }

    async fn reply(
        &self,
        to: SocketAddr,
        method: Method,
        token: &[u8; 12],
        key: Option<&Key>,
        append: impl FnOnce(&mut MessageEncoder),
    ) {
        let mut out = BytesMut::with_capacity(1280);
        let mut response = MessageEncoder::new(method, token, &mut out);
        append(&mut response);
        response.flush(key).unwrap();

        self.socket.send_to(&out, to).await.unwrap();
    }
}

fn init_logger() {
    // tests run in one process, only the first call wins.
    let _ = simple_logger::init_with_level(log::Level::Debug);
}

fn token_of(bytes: &[u8]) -> [u8; 12] {
    bytes[8..20].try_into().unwrap()
}

async fn indicate(server: &TestServer, to: SocketAddr, peer: SocketAddr, data: &'static [u8]) {
    let token = rand::random::<[u8; 12]>();
    server
        .reply(to, DATA_INDICATION, &token, None, |message| {
            message.append::<XorPeerAddress>(peer);
            message.append::<Data>(data);
        })
        .await;
}

#[tokio::test]
async fn test_binding_round_trip() -> Result<()> {
    init_logger();

    let server = TestServer::bind().await?;
    let session = Session::connect(SessionOptions::new(server.address()?)).await?;

    let server_task = tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        let (size, from) = server.recv(&mut buf).await;

        let mut attributes = Attributes::default();
        let message = Message::decode(&buf[..size], &mut attributes).unwrap();
        assert_eq!(message.method(), BINDING_REQUEST);

        let token = token_of(&buf);
        server
            .reply(from, BINDING_RESPONSE, &token, None, |response| {
                response.append::<XorMappedAddress>("192.0.2.1:4660".parse().unwrap());
            })
            .await;

        // persist is a binding indication, nothing is replied.
        let (size, _) = server.recv(&mut buf).await;
        let mut attributes = Attributes::default();
        let message = Message::decode(&buf[..size], &mut attributes).unwrap();
        assert_eq!(message.method(), BINDING_INDICATION);
    });

    let reflexive = session.bind().await.unwrap();
    assert_eq!(reflexive, "192.0.2.1:4660".parse()?);

    session.persist().await?;

    server_task.await?;
    Ok(())
}

#[tokio::test]
async fn test_challenge_then_allocate() -> Result<()> {
    let server = TestServer::bind().await?;

    let mut options = SessionOptions::new(server.address()?);
    options.username = Some("alice".to_string());
    options.secret = Some("s3cr3t".to_string());

    let session = Session::connect(options).await?;
    let key = Key::long_term("alice", "example.org", "s3cr3t");

    let server_task = tokio::spawn({
        let key = key.clone();
        async move {
            let mut buf = [0u8; 2048];

            // the first attempt is unauthenticated and gets challenged.
            let (size, from) = server.recv(&mut buf).await;
            {
                let mut attributes = Attributes::default();
                let message = Message::decode(&buf[..size], &mut attributes).unwrap();
                assert_eq!(message.method(), ALLOCATE_REQUEST);
                assert!(message.get::<UserName>().is_none());
            }

            let token = token_of(&buf);
            server
                .reply(from, ALLOCATE_ERROR, &token, None, |response| {
                    response.append::<ErrorCodeAttr>(ErrorCode::from(ErrorKind::Unauthorized));
                    response.append::<Realm>("example.org");
                    response.append::<Nonce>("N1");
                })
                .await;

            // the retry carries the promoted credentials and signs.
            let (size, from) = server.recv(&mut buf).await;
            {
                let mut attributes = Attributes::default();
                let message = Message::decode(&buf[..size], &mut attributes).unwrap();
                assert_eq!(message.method(), ALLOCATE_REQUEST);
                assert_eq!(message.get::<UserName>(), Some("alice"));
                assert_eq!(message.get::<Realm>(), Some("example.org"));
                assert_eq!(message.get::<Nonce>(), Some("N1"));
                assert!(message.verify(&key).is_ok());
            }

            let token = token_of(&buf);
            server
                .reply(from, ALLOCATE_RESPONSE, &token, Some(&key), |response| {
                    response.append::<XorRelayedAddress>("198.51.100.7:49160".parse().unwrap());
                    response.append::<Lifetime>(600);
                })
                .await;

            // a stale nonce re-promotes with the fresh one.
            let (size, from) = server.recv(&mut buf).await;
            {
                let mut attributes = Attributes::default();
                let message = Message::decode(&buf[..size], &mut attributes).unwrap();
                assert_eq!(message.method(), REFRESH_REQUEST);
                assert_eq!(message.get::<Nonce>(), Some("N1"));
            }

            let token = token_of(&buf);
            server
                .reply(from, REFRESH_ERROR, &token, None, |response| {
                    response.append::<ErrorCodeAttr>(ErrorCode::from(ErrorKind::StaleNonce));
                    response.append::<Realm>("example.org");
                    response.append::<Nonce>("N2");
                })
                .await;

            // the retried refresh carries the new nonce; a zero lifetime
            // releases the allocation.
            let (size, from) = server.recv(&mut buf).await;
            {
                let mut attributes = Attributes::default();
                let message = Message::decode(&buf[..size], &mut attributes).unwrap();
                assert_eq!(message.method(), REFRESH_REQUEST);
                assert_eq!(message.get::<Nonce>(), Some("N2"));
                assert!(message.verify(&key).is_ok());
            }

            let token = token_of(&buf);
            server
                .reply(from, REFRESH_RESPONSE, &token, Some(&key), |response| {
                    response.append::<Lifetime>(0);
                })
                .await;
        }
    });

    assert!(matches!(session.allocate().await, Err(Error::Unauthorized)));

    let relayed = session.allocate().await.unwrap();
    assert_eq!(relayed, "198.51.100.7:49160".parse()?);

    // an allocation already present short-circuits without traffic.
    let again = session.allocate().await.unwrap();
    assert_eq!(again, relayed);

    assert!(matches!(session.refresh().await, Err(Error::StaleNonce)));
    session.refresh().await.unwrap();

    // the zero lifetime response released the allocation.
    assert!(matches!(
        session
            .send("203.0.113.4:9000".parse()?, Bytes::from_static(b"hi"))
            .await,
        Err(Error::NoAllocation)
    ));

    server_task.await?;
    Ok(())
}

#[tokio::test]
async fn test_allocation_lifetime_expiry() -> Result<()> {
    let server = TestServer::bind().await?;
    let session = Session::connect(SessionOptions::new(server.address()?)).await?;

    let server_task = tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        let (_, from) = server.recv(&mut buf).await;

        let token = token_of(&buf);
        server
            .reply(from, ALLOCATE_RESPONSE, &token, None, |response| {
                response.append::<XorRelayedAddress>("198.51.100.7:49160".parse().unwrap());
                response.append::<Lifetime>(1);
            })
            .await;
    });

    let relayed = session.allocate().await.unwrap();
    assert_eq!(relayed, "198.51.100.7:49160".parse()?);
    server_task.await?;

    // once the lifetime runs out the relay reverts to empty and
    // everything depending on it fails, without any network traffic.
    sleep(Duration::from_millis(1300)).await;

    let result = session
        .send("203.0.113.4:9000".parse()?, Bytes::from_static(b"hi"))
        .await;
    assert!(matches!(result, Err(Error::NoAllocation)));

    let result = session.refresh().await;
    assert!(matches!(result, Err(Error::NoAllocation)));

    Ok(())
}

#[tokio::test]
async fn test_permission_acking() -> Result<()> {
    let server = TestServer::bind().await?;
    let session = Session::connect(SessionOptions::new(server.address()?)).await?;

    let server_task = tokio::spawn(async move {
        let mut buf = [0u8; 2048];

        let (_, from) = server.recv(&mut buf).await;
        let token = token_of(&buf);
        server
            .reply(from, ALLOCATE_RESPONSE, &token, None, |response| {
                response.append::<XorRelayedAddress>("198.51.100.7:49160".parse().unwrap());
                response.append::<Lifetime>(600);
            })
            .await;

        // one un-acked permission per peer address under one transaction.
        let (size, from) = server.recv(&mut buf).await;
        {
            let mut attributes = Attributes::default();
            let message = Message::decode(&buf[..size], &mut attributes).unwrap();
            assert_eq!(message.method(), CREATE_PERMISSION_REQUEST);

            let peers = message.get_all::<XorPeerAddress>().collect::<Vec<_>>();
            assert_eq!(
                peers,
                vec![
                    "203.0.113.4:0".parse().unwrap(),
                    "203.0.113.5:0".parse().unwrap(),
                ]
            );
        }

        let token = token_of(&buf);
        server
            .reply(from, CREATE_PERMISSION_RESPONSE, &token, None, |_| {})
            .await;

        // the send indication for the permitted peer.
        let (size, _) = server.recv(&mut buf).await;
        let mut attributes = Attributes::default();
        let message = Message::decode(&buf[..size], &mut attributes).unwrap();
        assert_eq!(message.method(), SEND_INDICATION);
        assert_eq!(
            message.get::<XorPeerAddress>(),
            Some("203.0.113.4:9000".parse().unwrap())
        );
        assert_eq!(message.get::<Data>(), Some(&b"hi"[..]));
    });

    session.allocate().await.unwrap();
    session
        .create_permission(&["203.0.113.4".parse()?, "203.0.113.5".parse()?])
        .await
        .unwrap();

    session
        .send("203.0.113.4:9000".parse()?, Bytes::from_static(b"hi"))
        .await
        .unwrap();

    // the port is not part of the match, but the IP is.
    let result = session
        .send("203.0.113.9:9000".parse()?, Bytes::from_static(b"hi"))
        .await;
    assert!(matches!(result, Err(Error::NoPermission)));

    server_task.await?;
    Ok(())
}

#[tokio::test]
async fn test_concurrent_outstanding_transactions() -> Result<()> {
    let server = TestServer::bind().await?;
    let session = Session::connect(SessionOptions::new(server.address()?)).await?;

    let server_task = tokio::spawn(async move {
        let mut buf = [0u8; 2048];

        let (_, from) = server.recv(&mut buf).await;
        let token = token_of(&buf);
        server
            .reply(from, ALLOCATE_RESPONSE, &token, None, |response| {
                response.append::<XorRelayedAddress>("198.51.100.7:49160".parse().unwrap());
                response.append::<Lifetime>(600);
            })
            .await;

        // refresh goes out first, create permission second; the replies
        // are delivered in the opposite order.
        let (size, _) = server.recv(&mut buf).await;
        {
            let mut attributes = Attributes::default();
            let message = Message::decode(&buf[..size], &mut attributes).unwrap();
            assert_eq!(message.method(), REFRESH_REQUEST);
        }
        let refresh_token = token_of(&buf);

        let (size, from) = server.recv(&mut buf).await;
        {
            let mut attributes = Attributes::default();
            let message = Message::decode(&buf[..size], &mut attributes).unwrap();
            assert_eq!(message.method(), CREATE_PERMISSION_REQUEST);
        }
        let permission_token = token_of(&buf);

        server
            .reply(from, CREATE_PERMISSION_RESPONSE, &permission_token, None, |_| {})
            .await;

        sleep(Duration::from_millis(100)).await;

        server
            .reply(from, REFRESH_RESPONSE, &refresh_token, None, |response| {
                response.append::<Lifetime>(600);
            })
            .await;
    });

    session.allocate().await.unwrap();

    let completions = Arc::new(Mutex::new(Vec::new()));

    let refresh = tokio::spawn({
        let session = session.clone();
        let completions = completions.clone();
        async move {
            session.refresh().await.unwrap();
            completions.lock().await.push("refresh");
        }
    });

    // let the refresh hit the wire first.
    sleep(Duration::from_millis(20)).await;

    let permission = tokio::spawn({
        let session = session.clone();
        let completions = completions.clone();
        async move {
            session
                .create_permission(&["203.0.113.4".parse().unwrap()])
                .await
                .unwrap();
            completions.lock().await.push("create-permission");
        }
    });

    refresh.await?;
    permission.await?;
    server_task.await?;

    // the response that arrived first completed its own caller first.
    assert_eq!(
        completions.lock().await.as_slice(),
        ["create-permission", "refresh"]
    );

    Ok(())
}

#[tokio::test]
async fn test_subscriber_dispatch() -> Result<()> {
    init_logger();

    let server = TestServer::bind().await?;
    let session = Session::connect(SessionOptions::new(server.address()?)).await?;

    // a binding round trip teaches the server the client's address.
    let server_socket = Arc::new(server);
    let client_addr = {
        let server = server_socket.clone();
        let server_task = tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            let (_, from) = server.recv(&mut buf).await;
            let token = token_of(&buf);
            server
                .reply(from, BINDING_RESPONSE, &token, None, |response| {
                    response.append::<XorMappedAddress>(from);
                })
                .await;
            from
        });

        session.bind().await.unwrap();
        server_task.await?
    };

    let peer: SocketAddr = "203.0.113.4:1000".parse()?;

    let (s1, mut rx1) = Subscriber::channel(16);
    let (s2, mut rx2) = Subscriber::channel(16);
    session.subscribe(&s1, peer.ip()).await?;
    session.subscribe(&s2, peer.ip()).await?;

    indicate(&server_socket, client_addr, peer, b"hi").await;

    let expected = InboundData {
        from: peer,
        data: Bytes::from_static(b"hi"),
    };
    assert_eq!(rx1.recv().await.as_ref(), Some(&expected));
    assert_eq!(rx2.recv().await.as_ref(), Some(&expected));

    // killing a subscriber removes it everywhere; the next indication
    // reaches only the survivor.
    drop(rx1);
    sleep(Duration::from_millis(50)).await;

    indicate(&server_socket, client_addr, peer, b"again").await;

    let expected = InboundData {
        from: peer,
        data: Bytes::from_static(b"again"),
    };
    assert_eq!(rx2.recv().await.as_ref(), Some(&expected));

    // unsubscribing the survivor silences it; doing it twice is a no-op.
    session.unsubscribe(&s2, peer.ip()).await?;
    session.unsubscribe(&s2, peer.ip()).await?;

    indicate(&server_socket, client_addr, peer, b"silent").await;
    sleep(Duration::from_millis(50)).await;
    assert!(rx2.try_recv().is_err());

    drop(s1);
    Ok(())
}

#[tokio::test]
async fn test_transaction_timeout() -> Result<()> {
    let server = TestServer::bind().await?;

    let mut options = SessionOptions::new(server.address()?);
    options.timeout = 200;

    let session = Session::connect(options).await?;

    // the server stays silent, the deadline replies instead.
    let started = tokio::time::Instant::now();
    let result = session.bind().await;

    assert!(matches!(result, Err(Error::Timeout)));
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(started.elapsed() < Duration::from_secs(2));

    Ok(())
}

#[tokio::test]
async fn test_operations_require_allocation() -> Result<()> {
    let server = TestServer::bind().await?;
    let session = Session::connect(SessionOptions::new(server.address()?)).await?;

    assert!(matches!(session.refresh().await, Err(Error::NoAllocation)));
    assert!(matches!(
        session.create_permission(&["203.0.113.4".parse()?]).await,
        Err(Error::NoAllocation)
    ));
    assert!(matches!(
        session
            .send("203.0.113.4:9000".parse()?, Bytes::from_static(b"hi"))
            .await,
        Err(Error::NoAllocation)
    ));

    Ok(())
}
