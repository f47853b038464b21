//! End-to-end flows driven step by step through the scheduler

use rtk_core::{CreateFlags, Error, Msg, ThreadStatus};

use super::*;

const REQUEST: u16 = 0x0200;
const RESPONSE: u16 = 0x0201;
const DATA: u16 = 0x0300;

#[test]
fn more_urgent_thread_runs_first() {
    let kernel = kernel();
    let t1 = kernel
        .create(stack(), 3, CreateFlags::WITHOUT_YIELD, entry, 0, "t1")
        .unwrap();
    let t2 = kernel
        .create(stack(), 1, CreateFlags::WITHOUT_YIELD, entry, 0, "t2")
        .unwrap();
    assert_eq!(kernel.status(t1), Some(ThreadStatus::Pending));
    assert_eq!(kernel.status(t2), Some(ThreadStatus::Pending));

    expect_next(&kernel, t2);
    assert_eq!(kernel.status(t1), Some(ThreadStatus::Pending));
}

#[test]
fn request_reply_round_trip() {
    let kernel = kernel();
    let consumer = spawn(&kernel, 3, "consumer");
    let producer = spawn(&kernel, 5, "producer");

    expect_next(&kernel, consumer);
    assert!(kernel.receive().is_err());

    expect_next(&kernel, producer);
    assert_eq!(
        kernel.send_receive(consumer, Msg::with_value(REQUEST, 1)),
        Err(nb::Error::WouldBlock)
    );

    expect_next(&kernel, consumer);
    let request = kernel.receive().unwrap();
    kernel
        .reply(&request, Msg::with_value(RESPONSE, request.value() + 1))
        .unwrap();

    expect_next(&kernel, producer);
    let reply = kernel.send_receive(consumer, Msg::with_value(REQUEST, 1)).unwrap();
    assert_eq!(reply.kind, RESPONSE);
    assert_eq!(reply.value(), 2);
    assert_eq!(reply.sender, consumer);
}

#[test]
fn thousand_round_trips() {
    let kernel = kernel();
    let consumer = spawn(&kernel, 3, "consumer");
    let producer = spawn(&kernel, 5, "producer");

    expect_next(&kernel, consumer);
    assert!(kernel.receive().is_err());

    let mut counter = 0;
    for _ in 0..1000 {
        expect_next(&kernel, producer);
        assert!(kernel.send_receive(consumer, Msg::with_value(REQUEST, counter)).is_err());
        assert_eq!(kernel.status(producer), Some(ThreadStatus::ReplyBlocked));

        expect_next(&kernel, consumer);
        let request = kernel.receive().unwrap();
        assert_eq!(request.sender, producer);
        kernel
            .reply(&request, Msg::with_value(RESPONSE, request.value() + 1))
            .unwrap();
        assert_eq!(kernel.receive(), Err(nb::Error::WouldBlock));

        expect_next(&kernel, producer);
        counter = kernel
            .send_receive(consumer, Msg::with_value(REQUEST, counter))
            .unwrap()
            .value();
    }

    assert_eq!(counter, 1000);
    assert_runqueue_consistent(&kernel);
}

#[test]
fn mailbox_absorbs_senders_in_order() {
    let kernel = kernel();
    let receiver = spawn(&kernel, 2, "receiver");
    let senders: std::vec::Vec<_> = ["s1", "s2", "s3", "s4", "s5"]
        .into_iter()
        .map(|name| spawn(&kernel, 6, name))
        .collect();

    expect_next(&kernel, receiver);
    kernel.init_mailbox(slots(4)).unwrap();
    kernel.sleep();

    for (n, sender) in senders[..4].iter().enumerate() {
        expect_next(&kernel, *sender);
        assert_eq!(kernel.send(receiver, Msg::with_value(DATA, n as u32)), Ok(()));
        assert_eq!(kernel.status(*sender), Some(ThreadStatus::Running));
    }
    assert_eq!(kernel.mailbox_len(receiver), Some(4));

    expect_next(&kernel, senders[4]);
    assert_eq!(kernel.try_send(receiver, Msg::with_value(DATA, 4)), Err(Error::NotReady));
    kernel.wakeup(receiver).unwrap();

    expect_next(&kernel, receiver);
    for (n, sender) in senders[..4].iter().enumerate() {
        let msg = kernel.receive().unwrap();
        assert_eq!(msg.sender, *sender);
        assert_eq!(msg.value(), n as u32);
    }
    assert_eq!(kernel.try_receive(), Err(Error::NotReady));
}

#[test]
fn queued_message_surfaces_before_waiting_sender() {
    let kernel = kernel();
    let receiver = spawn(&kernel, 2, "receiver");
    let first = spawn(&kernel, 6, "first");
    let second = spawn(&kernel, 6, "second");

    expect_next(&kernel, receiver);
    kernel.init_mailbox(slots(1)).unwrap();
    kernel.sleep();

    expect_next(&kernel, first);
    assert_eq!(kernel.send(receiver, Msg::with_value(DATA, 1)), Ok(()));

    expect_next(&kernel, second);
    assert_eq!(kernel.send(receiver, Msg::with_value(DATA, 2)), Err(nb::Error::WouldBlock));
    assert_eq!(kernel.status(second), Some(ThreadStatus::SendBlocked));

    expect_next(&kernel, first);
    kernel.wakeup(receiver).unwrap();
    expect_next(&kernel, receiver);

    let buffered = kernel.receive().unwrap();
    assert_eq!((buffered.sender, buffered.value()), (first, 1));
    // the waiter's message moved into the freed slot and the waiter is released
    assert_eq!(kernel.mailbox_len(receiver), Some(1));
    assert_eq!(kernel.status(second), Some(ThreadStatus::Pending));

    let moved = kernel.receive().unwrap();
    assert_eq!((moved.sender, moved.value()), (second, 2));
    assert_eq!(kernel.status(receiver), Some(ThreadStatus::Running));
    assert_eq!(kernel.mailbox_len(receiver), Some(0));

    kernel.sleep();
    expect_next(&kernel, first);
    expect_next(&kernel, second);
    assert_eq!(kernel.send(receiver, Msg::with_value(DATA, 2)), Ok(()));
    assert_runqueue_consistent(&kernel);
}

#[test]
fn waiting_requester_moved_into_mailbox_stays_blocked() {
    let kernel = kernel();
    let server = spawn(&kernel, 2, "server");
    let writer = spawn(&kernel, 6, "writer");
    let client = spawn(&kernel, 6, "client");

    expect_next(&kernel, server);
    kernel.init_mailbox(slots(1)).unwrap();
    kernel.sleep();

    expect_next(&kernel, writer);
    kernel.send(server, Msg::with_value(DATA, 1)).unwrap();
    expect_next(&kernel, client);
    assert!(kernel.send_receive(server, Msg::with_value(REQUEST, 7)).is_err());

    expect_next(&kernel, writer);
    kernel.wakeup(server).unwrap();
    expect_next(&kernel, server);

    assert_eq!(kernel.receive().unwrap().value(), 1);
    assert_eq!(kernel.status(client), Some(ThreadStatus::ReplyBlocked));

    let request = kernel.receive().unwrap();
    assert_eq!(request.sender, client);
    assert_eq!(kernel.status(client), Some(ThreadStatus::ReplyBlocked));

    kernel.reply(&request, Msg::with_value(RESPONSE, 8)).unwrap();
    assert_eq!(kernel.status(client), Some(ThreadStatus::Pending));
}
