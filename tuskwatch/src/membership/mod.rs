//! Zone Membership Tracking
//!
//! Turns a stream of per-entity position samples into one-shot ENTRY/EXIT
//! transitions.
//!
//! # Architecture
//!
//! ```text
//! SampleRecord ──validate──► EntityPosition ──► MembershipTracker::observe
//!                                                      │
//!                       ZoneRegistry ──────────────────┤
//!                       ReferenceFrame ────────────────┘
//!                                                      │
//!                                                      ▼
//!                                          Vec<Transition> (exits, entries)
//! ```
//!
//! Membership is stored per entity as the set of zones it was last seen in.
//! A transition is the set difference between that and the zones containing
//! the new sample.

mod sample;
mod tracker;

pub use sample::{
    EntityId, EntityPosition, SampleError, SampleRecord, Transition, TransitionKind,
};
pub use tracker::{MembershipTracker, ReplacePolicy};
