use serde::{Deserialize, Serialize};

use crate::net::Rank;

// the nine message kinds of the system. the first three run between workers
// (winemakers and students); the rest are status events addressed to the
// observer, which never replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tag {
    Request,
    Ack,
    SafePlaceUpdated,
    ProductionStarted,
    ProductionEnd,
    NoLongerParties,
    WantToParty,
    WinemakerSafePlaceUpdated,
    StudentSafePlaceUpdated,
}

// one payload shape for every kind; kinds that don't use a field leave it
// zero and receivers of those kinds ignore it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub safe_place_id: u32,
    pub wine_amount: u32,
}

impl Payload {
    pub fn wine(wine_amount: u32) -> Self {
        Self {
            wine_amount,
            ..Default::default()
        }
    }

    pub fn update(safe_place_id: u32, wine_amount: u32) -> Self {
        Self {
            safe_place_id,
            wine_amount,
        }
    }
}

// what travels on the wire: (tag, timestamp, safe_place_id, wine_amount).
// the sender rank comes from the substrate, the same way MPI reports a status
// source
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Frame {
    pub tag: Tag,
    pub timestamp: u64,
    pub payload: Payload,
}

// what the transmitter hands to the dispatcher. `prev_clock` is the local
// clock as it was before this message advanced it, captured on the receive
// path and nowhere later. it is a diagnostic snapshot only: the critical
// section grant/defer rule compares the opponent's timestamp against the
// timestamp our own REQUEST broadcast carried (`request_ts` in the peer
// state), never against this drifted value
#[derive(Debug, Clone, Copy)]
pub struct Response {
    pub tag: Tag,
    pub source: Rank,
    pub timestamp: u64,
    pub prev_clock: u64,
    pub payload: Payload,
}
