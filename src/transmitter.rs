// typed clocked send/receive over the substrate. the transmitter owns the
// peer's logical clock: a single send ticks it, a broadcast bracket freezes
// it for the whole burst, and a receive applies max(local, remote)+1 while
// reporting the pre-update value back to the caller

use crate::{
    clock::{Bracket, LogicalClock},
    message::{Frame, Payload, Response, Tag},
    net::{Network, Rank},
};

#[derive(Debug)]
pub struct Transmitter<N> {
    clock: LogicalClock,
    net: N,
}

impl<N: Network> Transmitter<N> {
    pub fn new(net: N) -> Self {
        Self {
            clock: LogicalClock::default(),
            net,
        }
    }

    // single clocked send
    pub fn send(&self, tag: Tag, payload: Payload, dest: Rank) -> anyhow::Result<()> {
        let timestamp = self.clock.tick()?;
        self.net.send(
            dest,
            Frame {
                tag,
                timestamp,
                payload,
            },
        )
    }

    // open a broadcast bracket; every send through the guard carries the same
    // timestamp and no other local send or receive interleaves until drop
    pub fn broadcast(&self) -> anyhow::Result<Broadcast<'_, N>> {
        Ok(Broadcast {
            bracket: self.clock.bracket()?,
            net: &self.net,
        })
    }

    // blocking wildcard receive. `prev_clock` is read before the received
    // timestamp advances the clock; the request comparison in the peer layer
    // depends on that order
    pub fn receive(&self) -> anyhow::Result<Response> {
        let (source, frame) = self.net.recv()?;
        let prev_clock = self.clock.observe(frame.timestamp)?;
        Ok(Response {
            tag: frame.tag,
            source,
            timestamp: frame.timestamp,
            prev_clock,
            payload: frame.payload,
        })
    }
}

#[derive(Debug)]
pub struct Broadcast<'a, N> {
    bracket: Bracket<'a>,
    net: &'a N,
}

impl<N: Network> Broadcast<'_, N> {
    pub fn timestamp(&self) -> u64 {
        self.bracket.timestamp()
    }

    pub fn send(&self, tag: Tag, payload: Payload, dest: Rank) -> anyhow::Result<()> {
        self.net.send(
            dest,
            Frame {
                tag,
                timestamp: self.timestamp(),
                payload,
            },
        )
    }
}
