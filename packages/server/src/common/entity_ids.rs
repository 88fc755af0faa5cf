//! Typed ID definitions for all domain entities.
//!
//! Each entity gets a marker type and an `Id` alias, so the compiler rejects
//! a `RoundId` passed where a `DiscussionId` is expected.

pub use super::id::{Id, V4, V7};

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for User entities.
pub struct User;

/// Marker type for Discussion entities.
pub struct Discussion;

/// Marker type for DiscussionParticipant entities.
pub struct DiscussionParticipant;

/// Marker type for Round entities.
pub struct Round;

/// Marker type for Response entities.
pub struct Response;

/// Marker type for ResponseEdit entities.
pub struct ResponseEdit;

/// Marker type for DraftResponse entities.
pub struct DraftResponse;

/// Marker type for parameter Vote entities.
pub struct Vote;

/// Marker type for RemovalVote entities.
pub struct RemovalVote;

/// Marker type for JoinRequest entities.
pub struct JoinRequest;

/// Marker type for JoinRequestVote entities.
pub struct JoinRequestVote;

/// Marker type for RemovalAction audit entities.
pub struct RemovalAction;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

/// Typed ID for User entities.
pub type UserId = Id<User>;

/// Typed ID for Discussion entities.
pub type DiscussionId = Id<Discussion>;

/// Typed ID for DiscussionParticipant entities.
pub type ParticipantId = Id<DiscussionParticipant>;

/// Typed ID for Round entities.
pub type RoundId = Id<Round>;

/// Typed ID for Response entities.
pub type ResponseId = Id<Response>;

/// Typed ID for ResponseEdit entities.
pub type ResponseEditId = Id<ResponseEdit>;

/// Typed ID for DraftResponse entities.
pub type DraftId = Id<DraftResponse>;

/// Typed ID for parameter Vote entities.
pub type VoteId = Id<Vote>;

/// Typed ID for RemovalVote entities.
pub type RemovalVoteId = Id<RemovalVote>;

/// Typed ID for JoinRequest entities.
pub type JoinRequestId = Id<JoinRequest>;

/// Typed ID for JoinRequestVote entities.
pub type JoinRequestVoteId = Id<JoinRequestVote>;

/// Typed ID for RemovalAction audit entities.
pub type RemovalActionId = Id<RemovalAction>;
