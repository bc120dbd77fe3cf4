use num_bigint::BigUint;
use robustmix_network::{
    ClientTransport, DeserializedMessage, Frame, MessageHeader, ServerHooks, ServerTransport,
    SharedQueue,
};
use std::thread;
use std::time::{Duration, Instant};

const WIDTH: usize = 5;

fn wait_for<T>(mut poll: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(v) = poll() {
            return v;
        }
        assert!(Instant::now() < deadline, "timed out waiting for a frame");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn frames_cross_the_wire_and_replies_come_back() {
    let server = ServerTransport::bind(0, ServerHooks::default()).unwrap();
    let client = ClientTransport::connect("127.0.0.1", server.local_port()).unwrap();

    let elems: Vec<BigUint> = (1u64..=12).map(BigUint::from).collect();
    client.send_elements(7, 3, 4, &elems, WIDTH);

    let queue: SharedQueue<DeserializedMessage> = SharedQueue::new();
    let dm = wait_for(|| {
        server.update(WIDTH, &queue, usize::MAX);
        queue.pop_front()
    });
    assert_eq!(dm.sid, 7);
    assert_eq!(dm.sender_id, 3);
    assert_eq!(dm.mixing_state_id, 4);
    assert_eq!(dm.body, vec![elems]);

    // reply over the captured connection
    let conn = dm.conn.expect("submission path keeps the connection");
    conn.send(Frame {
        header: MessageHeader {
            sid: 7,
            sender_id: 1,
            mixing_state_id: 15,
            time_ns: MessageHeader::now_ns(),
            ..Default::default()
        },
        body: Vec::new(),
    });
    let reply = wait_for(|| client.incoming().pop_front());
    assert_eq!(reply.frame.header.mixing_state_id, 15);
    assert!(reply.frame.body.is_empty());

    server.shutdown();
}

#[test]
fn malformed_frames_are_dropped_by_update() {
    let server = ServerTransport::bind(0, ServerHooks::default()).unwrap();
    let client = ClientTransport::connect("127.0.0.1", server.local_port()).unwrap();

    // declare more elements than the body carries
    let mut frame = Frame::default();
    frame.push_elements(&[BigUint::from(9u32)], WIDTH);
    frame.header.num_elems = 3;
    frame.header.sid = 1;
    client.send_frame(frame);
    // a well-formed frame behind it still comes through
    client.send_elements(2, 1, 4, &[BigUint::from(5u32)], WIDTH);

    let queue: SharedQueue<DeserializedMessage> = SharedQueue::new();
    let dm = wait_for(|| {
        server.update(WIDTH, &queue, usize::MAX);
        queue.pop_front()
    });
    assert_eq!(dm.sid, 2);
    assert!(queue.pop_front().is_none());

    server.shutdown();
}

#[test]
fn rejected_connections_never_feed_the_queue() {
    let hooks = ServerHooks {
        on_connect: Box::new(|_| false),
        ..Default::default()
    };
    let server = ServerTransport::bind(0, hooks).unwrap();
    let client = ClientTransport::connect("127.0.0.1", server.local_port()).unwrap();
    client.send_elements(1, 1, 4, &[BigUint::from(5u32)], WIDTH);

    thread::sleep(Duration::from_millis(100));
    let queue: SharedQueue<DeserializedMessage> = SharedQueue::new();
    server.update(WIDTH, &queue, usize::MAX);
    assert!(queue.pop_front().is_none());
    assert_eq!(server.connection_count(), 0);

    server.shutdown();
}
