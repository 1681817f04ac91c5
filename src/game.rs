//! The tic-tac-toe board itself: move legality, turn order, and win/draw
//! detection. Nothing in this module knows about sockets, sessions, or
//! invitations; [`Game`] is driven purely by [`Role`] and cell numbers.

use parking_lot::Mutex;

/// A seat at the board, or the absence of one. The numeric values match the
/// wire protocol's role byte exactly, so `role as u8` is always the value
/// that belongs on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    None = 0,
    First = 1,
    Second = 2,
}

impl Role {
    pub fn from_wire(value: u8) -> Option<Role> {
        match value {
            0 => Some(Role::None),
            1 => Some(Role::First),
            2 => Some(Role::Second),
            _ => None,
        }
    }

    /// The other of the two playing roles: `(role % 2) + 1`, applied to the
    /// numeric value regardless of which role it started as.
    pub fn other(self) -> Role {
        Role::from_wire((self as u8) % 2 + 1).unwrap()
    }

    pub fn is_player(self) -> bool {
        !matches!(self, Role::None)
    }
}

const WINNING_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// A parsed, not-yet-applied move: a role and a 1-based cell number.
#[derive(Debug, Clone, Copy)]
pub struct GameMove {
    pub role: Role,
    pub position: u8,
}

impl GameMove {
    /// Parses a move from the textual form the wire protocol carries: a
    /// decimal integer in `[1, 9]` with no trailing characters.
    pub fn parse(role: Role, text: &str) -> Option<GameMove> {
        let text = text.trim_start();
        let position: u8 = text.parse().ok()?;
        if !(1..=9).contains(&position) {
            return None;
        }
        Some(GameMove { role, position })
    }
}

#[derive(Debug)]
struct GameState {
    board: [Role; 9],
    turn: Role,
    winner: Role,
}

impl GameState {
    fn new() -> Self {
        GameState {
            board: [Role::None; 9],
            turn: Role::First,
            winner: Role::None,
        }
    }

    fn is_over(&self) -> bool {
        !self.turn.is_player()
    }

    fn check_outcome(&mut self) {
        for line in WINNING_LINES {
            let [a, b, c] = line;
            if self.board[a].is_player() && self.board[a] == self.board[b] && self.board[b] == self.board[c] {
                self.winner = self.board[a];
                self.turn = Role::None;
                return;
            }
        }
        if self.board.iter().all(|r| r.is_player()) {
            self.winner = Role::None;
            self.turn = Role::None;
        }
    }

    /// Renders the board as `cell|cell|cell`, rows separated by
    /// `-----`, followed by a `"X to move"`/`"O to move"` line with no
    /// trailing newline. Empty cells render as a space.
    fn unparse(&self) -> String {
        let mut out = String::with_capacity(9 * 2 + 2 * 6 + 9);
        for row in 0..3 {
            for col in 0..3 {
                let cell = self.board[row * 3 + col];
                out.push(match cell {
                    Role::None => ' ',
                    Role::First => 'X',
                    Role::Second => 'O',
                });
                out.push(if col < 2 { '|' } else { '\n' });
            }
            if row < 2 {
                out.push_str("-----\n");
            }
        }
        out.push(if self.turn == Role::First { 'X' } else { 'O' });
        out.push_str(" to move");
        out
    }
}

/// One in-progress or finished tic-tac-toe game, guarded by a single mutex
/// since moves arrive serialized through each player's session anyway and
/// the board never needs to be read and written as separate steps.
pub struct Game {
    state: Mutex<GameState>,
}

impl Game {
    pub fn new() -> Game {
        Game {
            state: Mutex::new(GameState::new()),
        }
    }

    pub fn is_over(&self) -> bool {
        self.state.lock().is_over()
    }

    pub fn winner(&self) -> Role {
        self.state.lock().winner
    }

    pub fn whose_turn(&self) -> Role {
        self.state.lock().turn
    }

    pub fn unparse_state(&self) -> String {
        self.state.lock().unparse()
    }

    /// Applies a move if it is this role's turn and the cell is empty.
    /// Returns `false` without changing anything otherwise.
    pub fn apply_move(&self, mv: GameMove) -> bool {
        if !mv.role.is_player() || !(1..=9).contains(&mv.position) {
            return false;
        }
        let mut state = self.state.lock();
        if state.turn != mv.role {
            return false;
        }
        let idx = (mv.position - 1) as usize;
        if state.board[idx].is_player() {
            return false;
        }
        state.board[idx] = mv.role;
        state.turn = mv.role.other();
        state.check_outcome();
        true
    }

    /// Ends the game immediately in favor of the other role. Fails if the
    /// game is already over or `role` is not an active player.
    pub fn resign(&self, role: Role) -> bool {
        if !role.is_player() {
            return false;
        }
        let mut state = self.state.lock();
        if state.is_over() {
            return false;
        }
        state.winner = role.other();
        state.turn = Role::None;
        true
    }
}

impl Default for Game {
    fn default() -> Self {
        Game::new()
    }
}

/// The result of a finished game, used to update player ratings. The
/// numeric values line up with [`Role`]'s so that "swap the two players"
/// and "flip the outcome" are both the same `%2+1` transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Draw = 0,
    FirstWins = 1,
    SecondWins = 2,
}

impl Outcome {
    pub fn from_winner(winner: Role) -> Outcome {
        match winner {
            Role::None => Outcome::Draw,
            Role::First => Outcome::FirstWins,
            Role::Second => Outcome::SecondWins,
        }
    }

    /// The same outcome from the other player's point of view: a draw stays
    /// a draw, a win flips to the other side.
    pub fn swapped(self) -> Outcome {
        match self {
            Outcome::Draw => Outcome::Draw,
            other => match (other as u8) % 2 + 1 {
                1 => Outcome::FirstWins,
                _ => Outcome::SecondWins,
            },
        }
    }
}

/// Parses the output of [`GameState::unparse`] back into a board and a turn
/// indicator, written independently of `unparse` itself so a round-trip test
/// actually exercises two separate readings of the wire format.
#[cfg(test)]
fn parse_state(text: &str) -> Option<([Role; 9], Role)> {
    let mut rows = text.splitn(3, "\n-----\n");
    let row0 = rows.next()?;
    let row1 = rows.next()?;
    let rest = rows.next()?;
    let (row2, turn_line) = rest.split_once('\n')?;

    let mut board = [Role::None; 9];
    for (i, row) in [row0, row1, row2].into_iter().enumerate() {
        let cells: Vec<&str> = row.split('|').collect();
        if cells.len() != 3 {
            return None;
        }
        for (j, cell) in cells.into_iter().enumerate() {
            board[3 * i + j] = match cell {
                " " => Role::None,
                "X" => Role::First,
                "O" => Role::Second,
                _ => return None,
            };
        }
    }

    let turn = match turn_line {
        "X to move" => Role::First,
        "O to move" => Role::Second,
        _ => return None,
    };
    Some((board, turn))
}
