//! A single connected client: the socket used to reply to it, which player
//! (if any) is logged in on it, and the invitations it is party to.
//!
//! Every session operation is driven from the connection's own service
//! thread, but a session's methods are also called *from other threads*
//! when a peer needs to notify it (an invitation, a move, a resignation).
//! The inner state is therefore behind a re-entrant lock: a thread
//! notifying a peer while holding its own session's lock can still safely
//! call back into that peer's session without deadlocking on itself.

use std::cell::RefCell;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::client_registry::ClientRegistry;
use crate::error::SessionError;
use crate::game::{GameMove, Outcome, Role};
use crate::invitation::Invitation;
use crate::player::Player;
use crate::protocol::{self, PacketHeader, PacketType};
use crate::sparse_list::SparseList;

struct SessionInner {
    writer: TcpStream,
    player: Option<Arc<Player>>,
    invitations: SparseList<Arc<Invitation>>,
}

pub struct ClientSession {
    peer_addr: SocketAddr,
    shutdown_handle: TcpStream,
    inner: ReentrantMutex<RefCell<SessionInner>>,
}

impl ClientSession {
    pub fn new(peer_addr: SocketAddr, writer: TcpStream) -> io::Result<Arc<ClientSession>> {
        let shutdown_handle = writer.try_clone()?;
        Ok(Arc::new(ClientSession {
            peer_addr,
            shutdown_handle,
            inner: ReentrantMutex::new(RefCell::new(SessionInner {
                writer,
                player: None,
                invitations: SparseList::new(),
            })),
        }))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Shuts down the read half of the connection, unblocking this
    /// session's service thread out of a pending `recv_packet`.
    pub fn shutdown_read(&self) {
        let _ = self.shutdown_handle.shutdown(Shutdown::Read);
    }

    pub fn player(&self) -> Option<Arc<Player>> {
        self.inner.lock().borrow().player.clone()
    }

    pub fn send_packet(&self, header: PacketHeader, payload: &[u8]) -> io::Result<()> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        protocol::send_packet(&mut inner.writer, header, payload)
    }

    fn add_invitation(&self, inv: Arc<Invitation>) -> usize {
        self.inner.lock().borrow_mut().invitations.insert(inv)
    }

    fn get_invitation(&self, id: usize) -> Option<Arc<Invitation>> {
        self.inner.lock().borrow().invitations.get(id).cloned()
    }

    fn find_invitation_id(&self, inv: &Arc<Invitation>) -> Option<usize> {
        self.inner.lock().borrow().invitations.find(|x| Arc::ptr_eq(x, inv))
    }

    fn remove_invitation(&self, inv: &Arc<Invitation>) -> Option<usize> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let id = inner.invitations.find(|x| Arc::ptr_eq(x, inv))?;
        inner.invitations.remove(id);
        Some(id)
    }

    /// Logs this session in as `player`, provided it isn't already logged
    /// in and no other session currently holds the same player. `registry`
    /// supplies the lock serializing this check-then-set against every
    /// other connection's login attempt.
    pub fn login(self: &Arc<Self>, player: Arc<Player>, registry: &ClientRegistry) -> Result<(), SessionError> {
        let _login_guard = registry.login_lock().lock();
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if inner.player.is_some() {
            return Err(SessionError::AlreadyLoggedIn);
        }
        if registry.player_is_logged_in(&player) {
            return Err(SessionError::AlreadyLoggedInElsewhere);
        }
        inner.player = Some(player);
        Ok(())
    }

    /// Logs out, closing every invitation this session is party to:
    /// revoking or declining open ones and resigning in-progress games,
    /// each with the matching notification sent to the other side.
    pub fn logout(self: &Arc<Self>) -> Result<(), SessionError> {
        let invitations: Vec<Arc<Invitation>> = {
            let guard = self.inner.lock();
            let inner = guard.borrow();
            if inner.player.is_none() {
                return Err(SessionError::NotLoggedIn);
            }
            inner.invitations.iter().cloned().collect()
        };

        for inv in &invitations {
            let i_am_source = Arc::ptr_eq(&inv.source(), self);
            if inv.is_open() {
                let notify = if i_am_source { PacketType::Revoked } else { PacketType::Declined };
                self.close_open_invitation(inv, notify);
            } else if inv.game().is_some() {
                let my_role = if i_am_source { inv.source_role() } else { inv.target_role() };
                self.resign_invitation(inv, my_role);
            }
        }

        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.invitations = SparseList::new();
        inner.player = None;
        Ok(())
    }

    /// Invites `target` to a game, with `self` taking `source_role` and
    /// `target` taking `target_role`. Returns this session's own slot for
    /// the new invitation; `target` is sent an `INVITED` notification.
    pub fn make_invitation(
        self: &Arc<Self>,
        target: &Arc<ClientSession>,
        source_role: Role,
        target_role: Role,
    ) -> Result<usize, SessionError> {
        if Arc::ptr_eq(self, target) {
            return Err(SessionError::SourceEqualsTarget);
        }
        let inv = Invitation::create(self.clone(), target.clone(), source_role, target_role)
            .ok_or(SessionError::SourceEqualsTarget)?;
        let source_id = self.add_invitation(inv.clone());
        let target_id = target.add_invitation(inv.clone());

        let name = self.player().map(|p| p.name().to_string()).unwrap_or_default();
        let header = PacketHeader::new(PacketType::Invited, target_id as u8, target_role as u8);
        let _ = target.send_packet(header, name.as_bytes());

        Ok(source_id)
    }

    /// Revokes an invitation this session sent, which must still be open.
    pub fn revoke_invitation(self: &Arc<Self>, id: usize) -> Result<(), SessionError> {
        let inv = self.get_invitation(id).ok_or(SessionError::InvalidInvitation(id))?;
        if !Arc::ptr_eq(&inv.source(), self) {
            return Err(SessionError::NotParticipant);
        }
        if !inv.is_open() {
            return Err(SessionError::InvitationNotOpen);
        }
        self.close_open_invitation(&inv, PacketType::Revoked);
        self.remove_invitation(&inv);
        Ok(())
    }

    /// Declines an invitation this session received, which must still be
    /// open.
    pub fn decline_invitation(self: &Arc<Self>, id: usize) -> Result<(), SessionError> {
        let inv = self.get_invitation(id).ok_or(SessionError::InvalidInvitation(id))?;
        if !Arc::ptr_eq(&inv.target(), self) {
            return Err(SessionError::NotParticipant);
        }
        if !inv.is_open() {
            return Err(SessionError::InvitationNotOpen);
        }
        self.close_open_invitation(&inv, PacketType::Declined);
        self.remove_invitation(&inv);
        Ok(())
    }

    /// Accepts an invitation this session received. On success, returns the
    /// initial board state iff this session (the target) ended up as the
    /// game's first player; otherwise the state is delivered to the source
    /// via `ACCEPTED` instead, and this call returns `None`.
    pub fn accept_invitation(self: &Arc<Self>, id: usize) -> Result<Option<String>, SessionError> {
        let inv = self.get_invitation(id).ok_or(SessionError::InvalidInvitation(id))?;
        if !Arc::ptr_eq(&inv.target(), self) {
            return Err(SessionError::NotParticipant);
        }
        if !inv.accept() {
            return Err(SessionError::InvitationNotOpen);
        }
        let game = inv.game().expect("invitation was just accepted");
        let state = game.unparse_state();

        let source = inv.source();
        let source_id = source.find_invitation_id(&inv).unwrap_or(id);
        let header = PacketHeader::new(PacketType::Accepted, source_id as u8, 0);

        if inv.target_role() == Role::First {
            let _ = source.send_packet(header, &[]);
            Ok(Some(state))
        } else {
            let _ = source.send_packet(header, state.as_bytes());
            Ok(None)
        }
    }

    /// Resigns an in-progress game, ending it in the other player's favor.
    pub fn resign_game(self: &Arc<Self>, id: usize) -> Result<(), SessionError> {
        let inv = self.get_invitation(id).ok_or(SessionError::InvalidInvitation(id))?;
        let i_am_source = Arc::ptr_eq(&inv.source(), self);
        let i_am_target = Arc::ptr_eq(&inv.target(), self);
        if !i_am_source && !i_am_target {
            return Err(SessionError::NotParticipant);
        }
        if inv.game().is_none() {
            return Err(SessionError::NoGameInProgress);
        }
        let my_role = if i_am_source { inv.source_role() } else { inv.target_role() };
        self.resign_invitation(&inv, my_role);
        self.remove_invitation(&inv);
        Ok(())
    }

    /// Applies a move to the game behind invitation `id`, notifying the
    /// peer and (if the move ends the game) posting the rating update and
    /// closing out the invitation on both sides. Returns the board state
    /// after the move.
    pub fn make_move(self: &Arc<Self>, id: usize, text: &str) -> Result<String, SessionError> {
        let inv = self.get_invitation(id).ok_or(SessionError::InvalidInvitation(id))?;
        let i_am_source = Arc::ptr_eq(&inv.source(), self);
        let i_am_target = Arc::ptr_eq(&inv.target(), self);
        if !i_am_source && !i_am_target {
            return Err(SessionError::NotParticipant);
        }
        let game = inv.game().ok_or(SessionError::NoGameInProgress)?;
        let my_role = if i_am_source { inv.source_role() } else { inv.target_role() };

        let mv = GameMove::parse(my_role, text).ok_or(SessionError::UnparsableMove)?;
        if !game.apply_move(mv) {
            return Err(SessionError::IllegalMove);
        }

        let peer = if i_am_source { inv.target() } else { inv.source() };
        if let Some(peer_id) = peer.find_invitation_id(&inv) {
            let header = PacketHeader::new(PacketType::Moved, peer_id as u8, my_role as u8);
            let _ = peer.send_packet(header, text.as_bytes());
        }

        if game.is_over() {
            self.resign_invitation(&inv, my_role);
            self.remove_invitation(&inv);
        }

        Ok(game.unparse_state())
    }

    /// Closes an open invitation and tells the other side it happened.
    fn close_open_invitation(self: &Arc<Self>, inv: &Arc<Invitation>, notify: PacketType) {
        if !inv.close(Role::None) {
            return;
        }
        let peer = if Arc::ptr_eq(&inv.source(), self) { inv.target() } else { inv.source() };
        if let Some(peer_id) = peer.find_invitation_id(inv) {
            let header = PacketHeader::new(notify, peer_id as u8, 0);
            let _ = peer.send_packet(header, &[]);
        }
        peer.remove_invitation(inv);
    }

    /// Ends the game behind an accepted invitation, in `my_role`'s favor if
    /// it wasn't already over. Posts the rating update and tells the other
    /// side via `ENDED`.
    fn resign_invitation(self: &Arc<Self>, inv: &Arc<Invitation>, my_role: Role) {
        let game = match inv.game() {
            Some(game) => game,
            None => return,
        };
        if !inv.close(my_role) {
            return;
        }
        let peer = if Arc::ptr_eq(&inv.source(), self) { inv.target() } else { inv.source() };

        if game.is_over() {
            if let (Some(mine), Some(theirs)) = (self.player(), peer.player()) {
                let (first, second) = if my_role == Role::First { (mine, theirs) } else { (theirs, mine) };
                Player::post_result(&first, &second, Outcome::from_winner(game.winner()));
            }
            if let Some(peer_id) = peer.find_invitation_id(inv) {
                let header = PacketHeader::new(PacketType::Ended, peer_id as u8, game.winner() as u8);
                let _ = peer.send_packet(header, &[]);
            }
        }
        peer.remove_invitation(inv);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    fn session_pair() -> (Arc<ClientSession>, Arc<ClientSession>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client_a = TcpStream::connect(addr).unwrap();
        let (server_a, _) = listener.accept().unwrap();
        let client_b = TcpStream::connect(addr).unwrap();
        let (server_b, _) = listener.accept().unwrap();

        let a = ClientSession::new(client_a.peer_addr().unwrap(), server_a).unwrap();
        let b = ClientSession::new(client_b.peer_addr().unwrap(), server_b).unwrap();
        (a, b)
    }

    #[test]
    fn invite_accept_and_move_flow() {
        let (a, b) = session_pair();
        let players = crate::player_registry::PlayerRegistry::new();
        let registry = crate::client_registry::ClientRegistry::new(4);
        a.login(players.register("alice"), &registry).unwrap();
        b.login(players.register("bob"), &registry).unwrap();

        let a_id = a.make_invitation(&b, Role::First, Role::Second).unwrap();
        let b_id = b.find_invitation_id(&b.get_invitation(0).unwrap()).unwrap();
        assert_eq!(b_id, 0);

        assert!(b.accept_invitation(b_id).unwrap().is_none());
        let state = a.make_move(a_id, "5").unwrap();
        assert!(state.contains('X'));
    }

    #[test]
    fn revoke_requires_being_the_source() {
        let (a, b) = session_pair();
        let players = crate::player_registry::PlayerRegistry::new();
        let registry = crate::client_registry::ClientRegistry::new(4);
        a.login(players.register("alice"), &registry).unwrap();
        b.login(players.register("bob"), &registry).unwrap();

        let a_id = a.make_invitation(&b, Role::First, Role::Second).unwrap();
        assert_eq!(b.revoke_invitation(0), Err(SessionError::NotParticipant));
        assert!(a.revoke_invitation(a_id).is_ok());
    }

    #[test]
    fn logging_in_twice_on_the_same_session_fails() {
        let (a, _b) = session_pair();
        let players = crate::player_registry::PlayerRegistry::new();
        let registry = crate::client_registry::ClientRegistry::new(4);
        a.login(players.register("alice"), &registry).unwrap();
        assert_eq!(
            a.login(players.register("alice2"), &registry),
            Err(SessionError::AlreadyLoggedIn)
        );
    }
}
