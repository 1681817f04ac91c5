//! An invitation ties two sessions together, with roles assigned, and
//! carries the [`Game`] that comes into being once it is accepted.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::game::{Game, Role};
use crate::session::ClientSession;

enum State {
    Open,
    Accepted(Arc<Game>),
    Closed,
}

/// One outstanding invitation from `source` to `target`, open until it is
/// revoked, declined, or accepted, and then (if accepted) open until the
/// resulting game is resigned or finishes.
pub struct Invitation {
    source: Arc<ClientSession>,
    target: Arc<ClientSession>,
    source_role: Role,
    target_role: Role,
    state: Mutex<State>,
}

impl Invitation {
    /// Creates a new open invitation, or `None` if `source` and `target`
    /// are the same session.
    pub fn create(
        source: Arc<ClientSession>,
        target: Arc<ClientSession>,
        source_role: Role,
        target_role: Role,
    ) -> Option<Arc<Invitation>> {
        if Arc::ptr_eq(&source, &target) {
            return None;
        }
        Some(Arc::new(Invitation {
            source,
            target,
            source_role,
            target_role,
            state: Mutex::new(State::Open),
        }))
    }

    pub fn source(&self) -> Arc<ClientSession> {
        self.source.clone()
    }

    pub fn target(&self) -> Arc<ClientSession> {
        self.target.clone()
    }

    pub fn source_role(&self) -> Role {
        self.source_role
    }

    pub fn target_role(&self) -> Role {
        self.target_role
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.lock(), State::Open)
    }

    pub fn game(&self) -> Option<Arc<Game>> {
        match &*self.state.lock() {
            State::Accepted(game) => Some(game.clone()),
            _ => None,
        }
    }

    /// Moves an open invitation into the accepted state with a fresh game.
    /// Returns `false` if the invitation was not open.
    pub fn accept(&self) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, State::Open) {
            return false;
        }
        *state = State::Accepted(Arc::new(Game::new()));
        true
    }

    /// Closes the invitation: revoke/decline an open one, or resign an
    /// in-progress game by `role`. Returns `false` if the invitation is
    /// already closed, or if it's accepted but `role` is not a player.
    ///
    /// When the invitation is accepted, the underlying game's own resign
    /// outcome is not consulted: the invitation still transitions to closed
    /// even if the game had already finished through play.
    pub fn close(&self, resigning_role: Role) -> bool {
        let mut state = self.state.lock();
        match &*state {
            State::Open => {
                *state = State::Closed;
                true
            }
            State::Accepted(game) => {
                if !resigning_role.is_player() {
                    return false;
                }
                let _ = game.resign(resigning_role);
                *state = State::Closed;
                true
            }
            State::Closed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    fn test_session() -> Arc<ClientSession> {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        ClientSession::new(client.peer_addr().unwrap(), server).unwrap()
    }

    #[test]
    fn create_rejects_self_invitation() {
        let a = test_session();
        assert!(Invitation::create(a.clone(), a, Role::First, Role::Second).is_none());
    }

    #[test]
    fn accept_is_one_shot() {
        let a = test_session();
        let b = test_session();
        let inv = Invitation::create(a, b, Role::First, Role::Second).unwrap();
        assert!(inv.accept());
        assert!(!inv.accept());
        assert!(inv.game().is_some());
    }

    #[test]
    fn close_an_open_invitation_ignores_role() {
        let a = test_session();
        let b = test_session();
        let inv = Invitation::create(a, b, Role::First, Role::Second).unwrap();
        assert!(inv.close(Role::None));
        assert!(!inv.close(Role::None));
    }

    #[test]
    fn close_an_accepted_invitation_resigns_the_game() {
        let a = test_session();
        let b = test_session();
        let inv = Invitation::create(a, b, Role::First, Role::Second).unwrap();
        inv.accept();
        let game = inv.game().unwrap();
        assert!(inv.close(Role::First));
        assert!(game.is_over());
        assert_eq!(game.winner(), Role::Second);
    }

    #[test]
    fn close_an_accepted_invitation_with_no_role_fails() {
        let a = test_session();
        let b = test_session();
        let inv = Invitation::create(a, b, Role::First, Role::Second).unwrap();
        inv.accept();
        assert!(!inv.close(Role::None));
    }
}
