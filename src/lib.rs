// Winemakers & Students over pure message passing. Winemakers produce wine in
// random batches, students periodically demand random quantities, and both
// sides deposit into / withdraw from a bounded set of shared safe places. The
// safe places are guarded by a Ricart-Agrawala style distributed mutex on
// Lamport clocks (broadcast REQUEST/ACK with deferred replies); every peer
// mirrors the depot amounts through SAFE_PLACE_UPDATED broadcasts. Rank 0 is
// an observer that only consumes status events and renders global state.
//
// Each peer is one foreground worker thread driving the lifecycle plus one
// background receiver thread dispatching messages, sharing a single state
// mutex and a single condition variable. The substrate below them is an
// MPI-world-like mesh: reliable, FIFO per pair, wildcard receive, cardinality
// known at startup.

pub mod boot;
pub mod clock;
pub mod config;
pub mod depot;
pub mod message;
pub mod net;
pub mod observer;
pub mod peer;
pub mod student;
pub mod transmitter;
pub mod winemaker;
