//! Blocking end-to-end tests: a real server bound to an ephemeral port,
//! real `TcpStream` clients driving the wire protocol directly. No part of
//! the transport is mocked.

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use jeux::client_registry::ClientRegistry;
use jeux::player_registry::PlayerRegistry;
use jeux::protocol::{recv_packet, send_packet, PacketHeader, PacketType};
use jeux::service::serve_connection;

struct TestServer {
    addr: std::net::SocketAddr,
}

impl TestServer {
    fn start() -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = ClientRegistry::new(16);
        let players = PlayerRegistry::new();

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let registry = registry.clone();
                let players = players.clone();
                thread::spawn(move || serve_connection(stream, registry, players));
            }
        });

        TestServer { addr }
    }

    fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).unwrap()
    }
}

fn login(stream: &mut TcpStream, name: &str) {
    let header = PacketHeader::new(PacketType::Login, 0, 0);
    send_packet(stream, header, name.as_bytes()).unwrap();
    let (reply, _) = recv_packet(stream).unwrap();
    assert_eq!(reply.packet_type, PacketType::Ack, "login as {name} should be acknowledged");
}

#[test]
fn login_then_users_lists_logged_in_players() {
    let server = TestServer::start();
    let mut alice = server.connect();
    let mut bob = server.connect();
    login(&mut alice, "alice");
    login(&mut bob, "bob");

    let header = PacketHeader::new(PacketType::Users, 0, 0);
    send_packet(&mut alice, header, &[]).unwrap();
    let (reply, payload) = recv_packet(&mut alice).unwrap();
    assert_eq!(reply.packet_type, PacketType::Ack);
    let body = String::from_utf8(payload).unwrap();
    assert!(body.contains("alice"));
    assert!(body.contains("bob"));
}

#[test]
fn logging_in_twice_on_one_connection_is_rejected() {
    let server = TestServer::start();
    let mut alice = server.connect();
    login(&mut alice, "alice");

    let header = PacketHeader::new(PacketType::Login, 0, 0);
    send_packet(&mut alice, header, b"alice-again").unwrap();
    let (reply, _) = recv_packet(&mut alice).unwrap();
    assert_eq!(reply.packet_type, PacketType::Nack);
}

#[test]
fn same_player_cannot_log_in_on_two_connections_at_once() {
    let server = TestServer::start();
    let mut first = server.connect();
    login(&mut first, "alice");

    let mut second = server.connect();
    let header = PacketHeader::new(PacketType::Login, 0, 0);
    send_packet(&mut second, header, b"alice").unwrap();
    let (reply, _) = recv_packet(&mut second).unwrap();
    assert_eq!(reply.packet_type, PacketType::Nack);
}

#[test]
fn invite_accept_and_play_to_a_win() {
    let server = TestServer::start();
    let mut alice = server.connect();
    let mut bob = server.connect();
    login(&mut alice, "alice");
    login(&mut bob, "bob");

    // alice invites bob, alice takes the first-player role.
    let header = PacketHeader::new(PacketType::Invite, 0, 1);
    send_packet(&mut alice, header, b"bob").unwrap();
    let (ack, _) = recv_packet(&mut alice).unwrap();
    assert_eq!(ack.packet_type, PacketType::Ack);
    let invitation_id_for_alice = ack.id;

    let (invited, payload) = recv_packet(&mut bob).unwrap();
    assert_eq!(invited.packet_type, PacketType::Invited);
    assert_eq!(invited.role, 2, "bob should be offered the second-player role");
    assert_eq!(payload, b"alice");
    let invitation_id_for_bob = invited.id;

    let header = PacketHeader::new(PacketType::Accept, invitation_id_for_bob, 0);
    send_packet(&mut bob, header, &[]).unwrap();
    let (bob_ack, _) = recv_packet(&mut bob).unwrap();
    assert_eq!(bob_ack.packet_type, PacketType::Ack);

    let (accepted, _) = recv_packet(&mut alice).unwrap();
    assert_eq!(accepted.packet_type, PacketType::Accepted);
    assert_eq!(accepted.id, invitation_id_for_alice);

    // Alice (X) wins with a top row: 1, then bob takes 4, alice 2, bob 5, alice 3.
    // Every move's ACK (to the mover) and MOVED (to the peer) is drained in
    // the order the two streams actually deliver them.
    let mut make_move = |mover: &mut TcpStream, mover_id: u8, peer: &mut TcpStream, text: &str| {
        let header = PacketHeader::new(PacketType::Move, mover_id, 0);
        send_packet(mover, header, text.as_bytes()).unwrap();
        let (ack, _) = recv_packet(mover).unwrap();
        assert_eq!(ack.packet_type, PacketType::Ack);
        let (moved, _) = recv_packet(peer).unwrap();
        assert_eq!(moved.packet_type, PacketType::Moved);
    };

    make_move(&mut alice, invitation_id_for_alice, &mut bob, "1");
    make_move(&mut bob, invitation_id_for_bob, &mut alice, "4");
    make_move(&mut alice, invitation_id_for_alice, &mut bob, "2");
    make_move(&mut bob, invitation_id_for_bob, &mut alice, "5");

    let header = PacketHeader::new(PacketType::Move, invitation_id_for_alice, 0);
    send_packet(&mut alice, header, b"3").unwrap();
    let (final_ack, _) = recv_packet(&mut alice).unwrap();
    assert_eq!(final_ack.packet_type, PacketType::Ack);

    let (moved, _) = recv_packet(&mut bob).unwrap();
    assert_eq!(moved.packet_type, PacketType::Moved);
    let (ended, _) = recv_packet(&mut bob).unwrap();
    assert_eq!(ended.packet_type, PacketType::Ended);
    assert_eq!(ended.role, 1, "first player (alice) should be reported as the winner");
}

#[test]
fn revoking_an_invitation_notifies_the_target() {
    let server = TestServer::start();
    let mut alice = server.connect();
    let mut bob = server.connect();
    login(&mut alice, "alice");
    login(&mut bob, "bob");

    let header = PacketHeader::new(PacketType::Invite, 0, 1);
    send_packet(&mut alice, header, b"bob").unwrap();
    let (ack, _) = recv_packet(&mut alice).unwrap();
    let (invited, _) = recv_packet(&mut bob).unwrap();

    let header = PacketHeader::new(PacketType::Revoke, ack.id, 0);
    send_packet(&mut alice, header, &[]).unwrap();
    let (reply, _) = recv_packet(&mut alice).unwrap();
    assert_eq!(reply.packet_type, PacketType::Ack);

    let (revoked, _) = recv_packet(&mut bob).unwrap();
    assert_eq!(revoked.packet_type, PacketType::Revoked);
    assert_eq!(revoked.id, invited.id);
}

#[test]
fn disconnecting_closes_open_invitations_for_the_peer() {
    let server = TestServer::start();
    let mut alice = server.connect();
    let mut bob = server.connect();
    login(&mut alice, "alice");
    login(&mut bob, "bob");

    let header = PacketHeader::new(PacketType::Invite, 0, 1);
    send_packet(&mut alice, header, b"bob").unwrap();
    recv_packet(&mut alice).unwrap();
    recv_packet(&mut bob).unwrap();

    drop(alice);

    let (revoked, _) = recv_packet(&mut bob).unwrap();
    assert_eq!(revoked.packet_type, PacketType::Revoked);
}

#[test]
fn invite_rejects_an_offline_target() {
    let server = TestServer::start();
    let mut alice = server.connect();
    login(&mut alice, "alice");

    let header = PacketHeader::new(PacketType::Invite, 0, 1);
    send_packet(&mut alice, header, b"nobody").unwrap();
    let (reply, _) = recv_packet(&mut alice).unwrap();
    assert_eq!(reply.packet_type, PacketType::Nack);
}
