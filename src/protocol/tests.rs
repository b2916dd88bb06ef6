// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use futures::SinkExt;
use std::time::Duration;
use tokio::io::{duplex, split, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::core::codec::FrameCodec;
use crate::error::{FramingError, ProtocolError};
use crate::protocol::handshake::exchange_identities;
use crate::protocol::identity::{NodeId, GENERATED_ID_LEN};
use crate::protocol::message::Message;

type Reader = FramedRead<ReadHalf<DuplexStream>, FrameCodec>;
type Writer = FramedWrite<WriteHalf<DuplexStream>, FrameCodec>;

fn framed(stream: DuplexStream) -> (Reader, Writer) {
    let (read, write) = split(stream);
    (
        FramedRead::new(read, FrameCodec::default()),
        FramedWrite::new(write, FrameCodec::default()),
    )
}

#[test]
fn test_generated_identity_shape() {
    let id = NodeId::generate();
    assert_eq!(id.as_str().len(), GENERATED_ID_LEN);
    assert!(id
        .as_str()
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
}

#[test]
fn test_identity_validation() {
    assert!(NodeId::new("player-1").is_ok());
    assert!(NodeId::new("").is_err());
    assert!(NodeId::new("has space").is_err());
    assert!(NodeId::new("x".repeat(65)).is_err());
    assert!("abc_123".parse::<NodeId>().is_ok());
}

#[test]
fn test_message_text_form() {
    let id = NodeId::new("abcd1234").unwrap();
    assert_eq!(Message::Hello(id.clone()).to_string(), "HELLO abcd1234");
    assert_eq!(Message::Greet.to_string(), "GREET");
    assert_eq!(Message::Set { row: 2, col: 1 }.to_string(), "SET 2 1");

    assert_eq!("HELLO abcd1234".parse::<Message>(), Ok(Message::Hello(id)));
    assert_eq!("GREET".parse::<Message>(), Ok(Message::Greet));
    assert_eq!(
        "SET 0 2".parse::<Message>(),
        Ok(Message::Set { row: 0, col: 2 })
    );
}

#[test]
fn test_out_of_range_set_still_parses() {
    // Range checks belong to the board, not the wire.
    assert_eq!(
        "SET 7 9".parse::<Message>(),
        Ok(Message::Set { row: 7, col: 9 })
    );
}

#[test]
fn test_malformed_messages() {
    for text in [
        "", "SET", "SET 1", "SET a b", "SET 1 2 3", "SET -1 0", "GREET now", "HELLO",
        "hello abc", "BOGUS",
    ] {
        assert!(
            matches!(text.parse::<Message>(), Err(FramingError::Malformed(_))),
            "{text:?} should be malformed"
        );
    }
}

#[tokio::test]
async fn test_handshake_exchanges_both_identities() {
    let (left, right) = duplex(1024);
    let (mut l_reader, mut l_writer) = framed(left);
    let (mut r_reader, mut r_writer) = framed(right);
    let l_id = NodeId::new("left").unwrap();
    let r_id = NodeId::new("right").unwrap();
    let timeout = Duration::from_secs(1);

    let (seen_by_left, seen_by_right) = tokio::join!(
        exchange_identities(&mut l_reader, &mut l_writer, &l_id, timeout),
        exchange_identities(&mut r_reader, &mut r_writer, &r_id, timeout),
    );

    assert_eq!(seen_by_left.unwrap(), r_id);
    assert_eq!(seen_by_right.unwrap(), l_id);
}

#[tokio::test]
async fn test_handshake_times_out_on_silent_peer() {
    let (left, _right) = duplex(1024);
    let (mut reader, mut writer) = framed(left);
    let id = NodeId::new("lonely").unwrap();

    let err = exchange_identities(&mut reader, &mut writer, &id, Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(matches!(err, ProtocolError::Handshake(ref m) if m.contains("in time")));
}

#[tokio::test]
async fn test_handshake_rejects_non_hello_first_frame() {
    let (left, right) = duplex(1024);
    let (mut reader, mut writer) = framed(left);
    let (_r_reader, mut r_writer) = framed(right);

    r_writer.send(Message::Set { row: 0, col: 0 }).await.unwrap();

    let err = exchange_identities(
        &mut reader,
        &mut writer,
        &NodeId::new("me").unwrap(),
        Duration::from_secs(1),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ProtocolError::Handshake(ref m) if m.contains("SET")));
}

#[tokio::test]
async fn test_handshake_rejects_own_identity() {
    let (left, right) = duplex(1024);
    let (mut reader, mut writer) = framed(left);
    let (_r_reader, mut r_writer) = framed(right);
    let id = NodeId::new("twin").unwrap();

    r_writer.send(Message::Hello(id.clone())).await.unwrap();

    let err = exchange_identities(&mut reader, &mut writer, &id, Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(matches!(err, ProtocolError::Handshake(ref m) if m.contains("own identity")));
}

#[tokio::test]
async fn test_handshake_reports_early_close() {
    let (left, right) = duplex(1024);
    let (mut reader, mut writer) = framed(left);
    let (_r_read, mut r_write) = split(right);
    r_write.shutdown().await.unwrap();

    let err = exchange_identities(
        &mut reader,
        &mut writer,
        &NodeId::new("me").unwrap(),
        Duration::from_secs(1),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ProtocolError::Handshake(ref m) if m.contains("closed")));
}
