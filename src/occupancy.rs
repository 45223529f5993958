//! Per-region debounce: turns noisy per-frame candidates into a confirmed
//! status that only flips after the deviation has lasted the detect delay.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default time a differing candidate must persist before it is committed.
pub const DEFAULT_DETECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Occupancy {
    #[default]
    Vacant,
    Occupied,
}

impl Occupancy {
    pub fn from_occupied(occupied: bool) -> Self {
        if occupied {
            Self::Occupied
        } else {
            Self::Vacant
        }
    }

    pub fn is_occupied(self) -> bool {
        matches!(self, Self::Occupied)
    }
}

impl fmt::Display for Occupancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vacant => f.write_str("vacant"),
            Self::Occupied => f.write_str("occupied"),
        }
    }
}

/// Debounce state of one region. A pending flip always targets the opposite
/// of the confirmed status, so there is at most one in flight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DebounceState {
    Stable { confirmed: Occupancy },
    Pending { candidate: Occupancy, since_s: f64 },
}

impl Default for DebounceState {
    fn default() -> Self {
        Self::Stable {
            confirmed: Occupancy::Vacant,
        }
    }
}

impl DebounceState {
    /// Externally visible status.
    pub fn confirmed(&self) -> Occupancy {
        match *self {
            Self::Stable { confirmed } => confirmed,
            Self::Pending { candidate, .. } => {
                if candidate.is_occupied() {
                    Occupancy::Vacant
                } else {
                    Occupancy::Occupied
                }
            }
        }
    }

    /// Stream time at which the current deviation started, if any.
    pub fn pending_since(&self) -> Option<f64> {
        match *self {
            Self::Stable { .. } => None,
            Self::Pending { since_s, .. } => Some(since_s),
        }
    }

    /// Feeds one frame's candidate at stream time `t_s`. Returns the new
    /// confirmed status when this frame commits a flip.
    ///
    /// The timer starts at the first differing frame and is never reset by
    /// later frames that agree with it; a single frame matching the confirmed
    /// status cancels it.
    pub fn step(&mut self, candidate: Occupancy, t_s: f64, delay: Duration) -> Option<Occupancy> {
        let confirmed = self.confirmed();
        match *self {
            Self::Stable { .. } => {
                if candidate != confirmed {
                    *self = Self::Pending {
                        candidate,
                        since_s: t_s,
                    };
                }
                None
            }
            Self::Pending { since_s, .. } => {
                if candidate == confirmed {
                    *self = Self::Stable { confirmed };
                    return None;
                }
                if t_s - since_s >= delay.as_secs_f64() {
                    *self = Self::Stable {
                        confirmed: candidate,
                    };
                    return Some(candidate);
                }
                None
            }
        }
    }
}
