//! The error taxonomy for session-level operations. Wire I/O failures stay
//! plain `std::io::Error` — they end the connection outright rather than
//! producing a NACK, so there is no reason to fold them into this type.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("client has not logged in")]
    NotLoggedIn,

    #[error("client has already logged in")]
    AlreadyLoggedIn,

    #[error("a player with this name is already logged in on another connection")]
    AlreadyLoggedInElsewhere,

    #[error("no invitation with id {0}")]
    InvalidInvitation(usize),

    #[error("client is not a participant in this invitation")]
    NotParticipant,

    #[error("invitation is not in the open state")]
    InvitationNotOpen,

    #[error("invitation has no game in progress")]
    NoGameInProgress,

    #[error("move text could not be parsed")]
    UnparsableMove,

    #[error("move is not legal in the current game state")]
    IllegalMove,

    #[error("no user is currently logged in under that name")]
    TargetNotOnline,

    #[error("role byte must identify first or second player")]
    InvalidRole,

    #[error("packet type is not valid as a client-to-server request")]
    UnexpectedPacketType,

    #[error("payload is required for this request")]
    MissingPayload,

    #[error("this request must not carry a payload")]
    UnexpectedPayload,

    #[error("source and target of an invitation must be different clients")]
    SourceEqualsTarget,
}
