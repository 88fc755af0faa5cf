//! Domain error taxonomy.
//!
//! Business-rule violations are typed variants with user-safe messages and no
//! partial state change behind them; the request layer maps them to responses
//! without leaking internals. Storage failures (including lock contention and
//! serialization conflicts) surface as `Database` for the caller to retry.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Debug, Error)]
pub enum DomainError {
    // ----- validation -----
    #[error("response content cannot be empty")]
    ContentEmpty,

    #[error("response exceeds maximum length of {max_chars} characters")]
    ContentTooLong { max_chars: i32 },

    #[error("invalid invite kind: {0}")]
    InvalidKind(String),

    #[error("discussion parameters outside configured bounds")]
    ParametersOutOfBounds,

    // ----- invite economy -----
    #[error("no {kind} invites available")]
    InsufficientInvites { kind: &'static str },

    // ----- response editing -----
    #[error("edit would change {requested} characters, but only {remaining} remain in budget")]
    EditBudgetExceeded { requested: i32, remaining: i32 },

    #[error("maximum of {limit} edits reached")]
    EditLimitExceeded { limit: i32 },

    #[error("response is locked")]
    ResponseLocked,

    #[error("can only edit your own responses")]
    NotOwner,

    // ----- round participation -----
    #[error("round is not accepting responses")]
    RoundNotAcceptingResponses,

    #[error("already responded in this round")]
    AlreadyResponded,

    #[error("not a participant in this discussion")]
    NotParticipant,

    // ----- voting -----
    #[error("round is not in its voting phase")]
    NotVotingPhase,

    #[error("not eligible to vote in this round")]
    NotEligibleVoter,

    #[error("vote already recorded")]
    DuplicateVote,

    // ----- removal / observer transitions -----
    #[error("both participants must have posted in the current round")]
    NotBothPosted,

    #[error("already removed this participant in this discussion")]
    DuplicateRemoval,

    #[error("cannot rejoin: {0}")]
    CannotRejoin(String),

    #[error("no round is in progress")]
    NoActiveRound,

    // ----- discussion lifecycle -----
    #[error("discussion is archived")]
    DiscussionArchived,

    #[error("discussion is at maximum capacity")]
    DiscussionFull,

    #[error("already a participant in this discussion")]
    AlreadyParticipant,

    #[error("a pending join request already exists")]
    DuplicateJoinRequest,

    // ----- programming-bug class -----
    /// Bookkeeping that must hold under correct sequencing was observed
    /// broken. Logged loudly at the detection site; never swallowed.
    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl DomainError {
    /// Raise an invariant violation, logging it before returning the error.
    pub fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(invariant = %msg, "invariant violation detected");
        DomainError::Invariant(msg)
    }
}
