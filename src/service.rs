//! The per-connection service loop: one thread per client, reading packets
//! off the socket and dispatching each to the session it belongs to.

use std::net::TcpStream;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::client_registry::ClientRegistry;
use crate::error::SessionError;
use crate::game::Role;
use crate::player::Player;
use crate::player_registry::PlayerRegistry;
use crate::protocol::{self, PacketHeader, PacketType};
use crate::session::ClientSession;

/// Runs the whole lifetime of one client connection: registers a session,
/// services packets until the socket closes or a fatal I/O error occurs,
/// then logs out and unregisters.
pub fn serve_connection(mut stream: TcpStream, registry: Arc<ClientRegistry>, players: Arc<PlayerRegistry>) {
    let session = match registry.register(&stream) {
        Ok(Some(session)) => session,
        Ok(None) => {
            debug!("rejecting connection, registry is at capacity");
            return;
        }
        Err(e) => {
            warn!("failed to register new connection: {e}");
            return;
        }
    };
    info!("client connected from {}", session.peer_addr());

    let mut logged_in_player: Option<Arc<Player>> = None;

    loop {
        let (header, payload) = match protocol::recv_packet(&mut stream) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("connection from {} closed: {e}", session.peer_addr());
                break;
            }
        };

        let outcome = dispatch(&session, &registry, &players, header, &payload, &mut logged_in_player);
        if let Err(e) = outcome {
            debug!("{} -> NACK: {e}", session.peer_addr());
            let nack = PacketHeader::new(PacketType::Nack, header.id, 0);
            if session.send_packet(nack, &[]).is_err() {
                break;
            }
        }
    }

    if logged_in_player.take().is_some() {
        let _ = session.logout();
    }
    registry.unregister(&session);
    info!("client {} disconnected", session.peer_addr());
}

fn dispatch(
    session: &Arc<ClientSession>,
    registry: &ClientRegistry,
    players: &PlayerRegistry,
    header: PacketHeader,
    payload: &[u8],
    logged_in_player: &mut Option<Arc<Player>>,
) -> Result<(), SessionError> {
    match header.packet_type {
        PacketType::Login => {
            if logged_in_player.is_some() {
                return Err(SessionError::AlreadyLoggedIn);
            }
            if payload.is_empty() {
                return Err(SessionError::MissingPayload);
            }
            let name = String::from_utf8_lossy(payload).into_owned();
            let player = players.register(&name);
            session.login(player.clone(), registry)?;
            *logged_in_player = Some(player);
            ack(session, header.id, &[])
        }

        PacketType::Users => {
            require_logged_in(logged_in_player)?;
            require_no_payload(payload)?;
            let mut body = String::new();
            for player in registry.all_logged_in_players() {
                body.push_str(player.name());
                body.push('\t');
                body.push_str(&player.rating().to_string());
                body.push('\n');
            }
            ack(session, header.id, body.as_bytes())
        }

        PacketType::Invite => {
            require_logged_in(logged_in_player)?;
            if payload.is_empty() {
                return Err(SessionError::MissingPayload);
            }
            let name = String::from_utf8_lossy(payload).into_owned();
            let target = registry.lookup_by_name(&name).ok_or(SessionError::TargetNotOnline)?;
            let source_role = Role::from_wire(header.role)
                .filter(|r| r.is_player())
                .ok_or(SessionError::InvalidRole)?;
            let target_role = source_role.other();
            let id = session.make_invitation(&target, source_role, target_role)?;
            ack(session, id as u8, &[])
        }

        PacketType::Revoke => {
            require_logged_in(logged_in_player)?;
            require_no_payload(payload)?;
            session.revoke_invitation(header.id as usize)?;
            ack(session, header.id, &[])
        }

        PacketType::Decline => {
            require_logged_in(logged_in_player)?;
            require_no_payload(payload)?;
            session.decline_invitation(header.id as usize)?;
            ack(session, header.id, &[])
        }

        PacketType::Accept => {
            require_logged_in(logged_in_player)?;
            require_no_payload(payload)?;
            let state = session.accept_invitation(header.id as usize)?;
            match state {
                Some(state) => ack(session, header.id, state.as_bytes()),
                None => ack(session, header.id, &[]),
            }
        }

        PacketType::Resign => {
            require_logged_in(logged_in_player)?;
            require_no_payload(payload)?;
            session.resign_game(header.id as usize)?;
            ack(session, header.id, &[])
        }

        PacketType::Move => {
            require_logged_in(logged_in_player)?;
            if payload.is_empty() {
                return Err(SessionError::MissingPayload);
            }
            let text = String::from_utf8_lossy(payload).into_owned();
            // The new state is delivered to the peer via MOVED, not echoed
            // back to the mover: ACK for MOVE always carries no payload.
            session.make_move(header.id as usize, &text)?;
            ack(session, header.id, &[])
        }

        other => {
            debug!("unexpected inbound packet type {other:?}");
            Err(SessionError::UnexpectedPacketType)
        }
    }
}

fn require_logged_in(logged_in_player: &Option<Arc<Player>>) -> Result<(), SessionError> {
    if logged_in_player.is_none() {
        return Err(SessionError::NotLoggedIn);
    }
    Ok(())
}

fn require_no_payload(payload: &[u8]) -> Result<(), SessionError> {
    if !payload.is_empty() {
        return Err(SessionError::UnexpectedPayload);
    }
    Ok(())
}

fn ack(session: &Arc<ClientSession>, id: u8, payload: &[u8]) -> Result<(), SessionError> {
    let header = PacketHeader::new(PacketType::Ack, id, 0);
    // A failed ACK write means the socket is already gone; the read loop's
    // next `recv_packet` will observe the same failure and tear things down.
    let _ = session.send_packet(header, payload);
    Ok(())
}
