// Business domains
pub mod discussions;
pub mod invites;
pub mod participants;
pub mod platform;
pub mod removal;
pub mod responses;
pub mod rounds;
pub mod voting;
