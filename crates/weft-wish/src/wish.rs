#![forbid(unsafe_code)]

//! The wish query and its state machine.
//!
//! ```text
//! Unresolved -> Resolving -> Resolved(list)
//!                   ^              |          (registry change on the tag)
//!                   +--------------+
//! any state ------------------------> Disposed  (instance teardown)
//! ```
//!
//! Transitions are methods; an illegal transition is a no-op returning
//! `false`, so a disposed wish can never be revived by a late resolution
//! pass.

use weft_core::{InstanceId, NodeId, PublicationId, Tag, Tick, WeftError};

/// How many matches a wish wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// Every match, in registration order.
    #[default]
    All,
    /// The single first-registered match.
    First,
}

/// Lifecycle state of a wish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WishState {
    Unresolved,
    Resolving,
    Resolved(Vec<PublicationId>),
    Disposed,
}

/// A standing tag query owned by one instance.
///
/// The wish's result is materialized as a derived node (`node`) whose
/// inputs are rewired to the matched sources on each resolution; the
/// runtime owns that wiring.
#[derive(Debug)]
pub struct Wish {
    pub tag: Tag,
    pub owner: InstanceId,
    pub policy: MatchPolicy,
    /// The result node in the graph.
    pub node: NodeId,
    /// Allow matching the composite identity's own publications.
    pub allow_self: bool,
    /// Ticks to wait for a first match before settling on an explicit
    /// empty result. `None` waits indefinitely.
    pub deadline_ticks: Option<u64>,
    /// Tick at which the wish was opened.
    pub opened_at: Tick,
    state: WishState,
    timeout: Option<WeftError>,
}

impl Wish {
    #[must_use]
    pub fn new(
        tag: Tag,
        owner: InstanceId,
        policy: MatchPolicy,
        node: NodeId,
        opened_at: Tick,
    ) -> Wish {
        Wish {
            tag,
            owner,
            policy,
            node,
            allow_self: false,
            deadline_ticks: None,
            opened_at,
            state: WishState::Unresolved,
            timeout: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> &WishState {
        &self.state
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        matches!(self.state, WishState::Disposed)
    }

    /// The timeout recorded when the deadline elapsed with no match, if
    /// any.
    #[must_use]
    pub fn timeout_error(&self) -> Option<&WeftError> {
        self.timeout.as_ref()
    }

    /// Enter `Resolving` from `Unresolved` or `Resolved`.
    pub fn begin_resolve(&mut self) -> bool {
        match self.state {
            WishState::Unresolved | WishState::Resolved(_) => {
                self.state = WishState::Resolving;
                true
            }
            WishState::Resolving | WishState::Disposed => false,
        }
    }

    /// Settle on a match list. Only valid from `Resolving`.
    pub fn complete_resolve(&mut self, matches: Vec<PublicationId>) -> bool {
        match self.state {
            WishState::Resolving => {
                if !matches.is_empty() {
                    // A late match supersedes an earlier timeout.
                    self.timeout = None;
                }
                self.state = WishState::Resolved(matches);
                true
            }
            _ => false,
        }
    }

    /// Record that the deadline elapsed with no match; settles on an empty
    /// result rather than waiting forever.
    pub fn mark_timed_out(&mut self, ticks: u64) {
        if self.is_disposed() {
            return;
        }
        self.timeout = Some(WeftError::ResolutionTimeout {
            tag: self.tag.as_str().to_owned(),
            ticks,
        });
        self.state = WishState::Resolved(Vec::new());
    }

    /// Terminal transition on instance teardown.
    pub fn dispose(&mut self) {
        self.state = WishState::Disposed;
    }

    /// Current matches (empty while unresolved, resolving, or disposed).
    #[must_use]
    pub fn matches(&self) -> &[PublicationId] {
        match &self.state {
            WishState::Resolved(list) => list,
            _ => &[],
        }
    }
}
