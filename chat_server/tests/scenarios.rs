//! End-to-end scenarios driven over real TCP sockets against an in-process
//! server bound to an ephemeral port.

use std::time::Duration;

use chat_server::registry::Registry;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

async fn spawn_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(chat_server::serve(listener, Registry::new()));
    addr
}

async fn join(addr: std::net::SocketAddr, name: &str, room: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(format!("JOIN {name} {room}\n").as_bytes())
        .await
        .unwrap();
    stream
}

async fn read_line(stream: &mut TcpStream) -> String {
    let mut buf = vec![0u8; 4096];
    let n = timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("timed out waiting for data")
        .unwrap();
    String::from_utf8_lossy(&buf[..n]).into_owned()
}

#[tokio::test]
async fn two_party_exchange_is_broadcast_with_sender_prefix() {
    let addr = spawn_server().await;

    let mut alice = join(addr, "alice", "lobby").await;
    // Give alice's reader a moment to register before bob joins, so the
    // "has joined" ordering below is deterministic.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut bob = join(addr, "bob", "lobby").await;

    let alice_sees_bob_join = read_line(&mut alice).await;
    assert_eq!(alice_sees_bob_join, "bob has joined\n");

    bob.write_all(b"hello room\n").await.unwrap();
    let alice_sees_message = read_line(&mut alice).await;
    assert_eq!(alice_sees_message, "bob:hello room\n");
}

#[tokio::test]
async fn leaving_announces_departure_to_remaining_members() {
    let addr = spawn_server().await;

    let mut alice = join(addr, "alice", "lobby").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let bob = join(addr, "bob", "lobby").await;

    let _ = read_line(&mut alice).await; // "bob has joined"

    drop(bob);

    let departure = read_line(&mut alice).await;
    assert_eq!(departure, "bob has left\n");
}

#[tokio::test]
async fn room_is_recreated_after_draining_to_empty() {
    let addr = spawn_server().await;

    let alice = join(addr, "alice", "lobby").await;
    drop(alice);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The room should be dormant/gone now; a fresh join under the same name
    // must succeed rather than silently joining a torn-down mailbox.
    let mut carol = join(addr, "carol", "lobby").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut dave = join(addr, "dave", "lobby").await;

    let carol_sees_dave_join = read_line(&mut carol).await;
    assert_eq!(carol_sees_dave_join, "dave has joined\n");
    let _ = dave;
}

#[tokio::test]
async fn oversize_line_triggers_error_and_disconnect() {
    let addr = spawn_server().await;
    let mut alice = join(addr, "alice", "lobby").await;

    let huge = vec![b'x'; 25_000];
    alice.write_all(&huge).await.unwrap();
    alice.write_all(b"\n").await.unwrap();

    let reply = read_line(&mut alice).await;
    assert_eq!(reply, "ERROR\n");
}

#[tokio::test]
async fn malformed_join_gets_error_and_disconnect() {
    let addr = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"NOPE not a join\n").await.unwrap();

    let reply = read_line(&mut stream).await;
    assert_eq!(reply, "ERROR\n");
}

#[tokio::test]
async fn join_timeout_closes_without_error_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let registry = Registry::new();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        chat_server::connection::handle_with_timeout(socket, registry, Duration::from_millis(50))
            .await;
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    // Never send a JOIN line: the server should close after the short
    // timeout without ever writing ERROR\n.
    let mut buf = [0u8; 16];
    let n = timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("server never closed the connection")
        .unwrap();
    assert_eq!(n, 0, "expected a silent EOF, got {:?}", &buf[..n]);
}
