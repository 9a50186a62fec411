use nexo_core::ParticipantId;
use std::cmp::Ordering;
use std::fmt;

/// Per-session negotiation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalingState {
    Idle,
    HaveLocalOffer,
    HaveRemoteOffer,
    Stable,
    Closed,
}

impl SignalingState {
    /// An offer/answer exchange is in flight.
    pub fn is_negotiating(self) -> bool {
        matches!(
            self,
            SignalingState::HaveLocalOffer | SignalingState::HaveRemoteOffer
        )
    }
}

impl fmt::Display for SignalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalingState::Idle => "idle",
            SignalingState::HaveLocalOffer => "have-local-offer",
            SignalingState::HaveRemoteOffer => "have-remote-offer",
            SignalingState::Stable => "stable",
            SignalingState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Decide a glare: both sides have an offer outstanding.
///
/// The offer with the higher tiebreaker survives; equal tiebreakers fall back
/// to the participant ids. A remote offer without a tiebreaker always wins.
pub fn local_offer_wins(
    local_tiebreaker: u64,
    local_id: &ParticipantId,
    remote_tiebreaker: Option<u64>,
    remote_id: &ParticipantId,
) -> bool {
    let Some(remote_tiebreaker) = remote_tiebreaker else {
        return false;
    };
    match local_tiebreaker.cmp(&remote_tiebreaker) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => local_id > remote_id,
    }
}
