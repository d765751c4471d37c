use bytes::BytesMut;
use criterion::{Criterion, criterion_group, criterion_main};
use turn_client_codec::{
    Attributes,
    crypto::Key,
    message::{Message, MessageEncoder, attributes::*, methods::*},
};

const TOKEN: [u8; 12] = [
    0x64, 0x4f, 0x5a, 0x78, 0x6a, 0x56, 0x33, 0x62, 0x4b, 0x52, 0x33, 0x31,
];

fn criterion_benchmark(c: &mut Criterion) {
    let key = Key::long_term("panda", "raspberry", "panda");

    let mut buf = BytesMut::with_capacity(1280);
    {
        let mut message = MessageEncoder::new(ALLOCATE_REQUEST, &TOKEN, &mut buf);
        message.append::<RequestedTransport>(Transport::Udp);
        message.append::<UserName>("panda");
        message.append::<Realm>("raspberry");
        message.append::<Nonce>("1c13d2b245b3a734");
        message.flush(Some(&key)).unwrap();
    }

    let bytes = buf.freeze();

    c.bench_function("decode_allocate_request", |b| {
        let mut attributes = Attributes::default();
        b.iter(|| {
            Message::decode(&bytes, &mut attributes).unwrap();
        })
    });

    c.bench_function("decode_and_verify", |b| {
        let mut attributes = Attributes::default();
        b.iter(|| {
            let message = Message::decode(&bytes, &mut attributes).unwrap();
            message.verify(&key).unwrap();
        })
    });

    c.bench_function("encode_allocate_request", |b| {
        let mut buf = BytesMut::with_capacity(1280);
        b.iter(|| {
            let mut message = MessageEncoder::new(ALLOCATE_REQUEST, &TOKEN, &mut buf);
            message.append::<RequestedTransport>(Transport::Udp);
            message.append::<UserName>("panda");
            message.append::<Realm>("raspberry");
            message.append::<Nonce>("1c13d2b245b3a734");
            message.flush(Some(&key)).unwrap();
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
