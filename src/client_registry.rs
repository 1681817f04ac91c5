//! The set of currently-connected sessions, bounded to a configured
//! maximum, with the synchronization every connection's service thread
//! needs from it: a login lock shared by all sessions, lookup by player
//! name, and a way for the accept loop to wait for every connection to
//! finish during shutdown.

use std::net::TcpStream;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::player::Player;
use crate::session::ClientSession;
use crate::sparse_list::SparseList;

struct State {
    sessions: SparseList<Arc<ClientSession>>,
    waiting: usize,
}

pub struct ClientRegistry {
    max_clients: usize,
    state: Mutex<State>,
    drained: Condvar,
    /// Serializes "is this player already logged in somewhere" checks
    /// against concurrent logins, so two connections can't both win a race
    /// to log in as the same player.
    login_lock: Mutex<()>,
}

impl ClientRegistry {
    pub fn new(max_clients: usize) -> Arc<ClientRegistry> {
        Arc::new(ClientRegistry {
            max_clients,
            state: Mutex::new(State {
                sessions: SparseList::new(),
                waiting: 0,
            }),
            drained: Condvar::new(),
            login_lock: Mutex::new(()),
        })
    }

    pub fn login_lock(&self) -> &Mutex<()> {
        &self.login_lock
    }

    /// Registers a freshly accepted connection, or returns `Ok(None)` if
    /// the registry is already at capacity.
    pub fn register(&self, stream: &TcpStream) -> std::io::Result<Option<Arc<ClientSession>>> {
        let mut state = self.state.lock();
        if state.sessions.count() >= self.max_clients {
            return Ok(None);
        }
        let peer_addr = stream.peer_addr()?;
        let writer = stream.try_clone()?;
        let session = ClientSession::new(peer_addr, writer)?;
        state.sessions.insert(session.clone());
        Ok(Some(session))
    }

    pub fn unregister(&self, session: &Arc<ClientSession>) {
        let mut state = self.state.lock();
        if let Some(idx) = state.sessions.find(|s| Arc::ptr_eq(s, session)) {
            state.sessions.remove(idx);
        }
        if state.sessions.count() == 0 && state.waiting > 0 {
            state.waiting = 0;
            self.drained.notify_all();
        }
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<ClientSession>> {
        let state = self.state.lock();
        state
            .sessions
            .iter()
            .find(|s| s.player().map(|p| p.name() == name).unwrap_or(false))
            .cloned()
    }

    pub fn player_is_logged_in(&self, player: &Arc<Player>) -> bool {
        let state = self.state.lock();
        state
            .sessions
            .iter()
            .any(|s| s.player().map(|p| Arc::ptr_eq(&p, player)).unwrap_or(false))
    }

    pub fn all_logged_in_players(&self) -> Vec<Arc<Player>> {
        let state = self.state.lock();
        state.sessions.iter().filter_map(|s| s.player()).collect()
    }

    pub fn client_count(&self) -> usize {
        self.state.lock().sessions.count()
    }

    /// Blocks until no connections remain, used during shutdown after every
    /// session's read half has been closed.
    pub fn wait_for_empty(&self) {
        let mut state = self.state.lock();
        while state.sessions.count() > 0 {
            state.waiting += 1;
            self.drained.wait(&mut state);
        }
    }

    /// Shuts down the read half of every connected session, unblocking
    /// each one's service thread so it can run its own logout and exit.
    pub fn shutdown_all(&self) {
        let state = self.state.lock();
        for session in state.sessions.iter() {
            session.shutdown_read();
        }
    }
}
