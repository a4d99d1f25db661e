// the producer lifecycle: announce production, sleep, draw a batch, then
// carry it until some safe place takes it. the carry loop re-enters the
// critical section to poll the replica; the polling is deliberate and paced
// by the naps between attempts

use std::{sync::Arc, thread, time::Duration};

use rand::{rngs::StdRng, Rng};
use tracing::debug;

use crate::{
    config::OBSERVER_RANK,
    message::{Payload, Tag},
    net::Network,
    peer::{Peer, Worker},
};

#[derive(Debug)]
pub struct Winemaker<N> {
    peer: Arc<Peer<N>>,
    rng: StdRng,
    cycles: Option<u64>,
}

impl<N: Network> Winemaker<N> {
    pub fn new(peer: Arc<Peer<N>>, rng: StdRng) -> Self {
        Self {
            peer,
            rng,
            cycles: None,
        }
    }

    // bound the lifecycle for quiescent cohorts; the default is to run until
    // externally terminated
    pub fn cycles(mut self, cycles: u64) -> Self {
        self.cycles = Some(cycles);
        self
    }

    fn make_wine(&mut self) -> anyhow::Result<u32> {
        self.peer
            .transmitter()
            .send(Tag::ProductionStarted, Payload::default(), OBSERVER_RANK)?;
        self.nap();
        let wine_available = self
            .rng
            .gen_range(1..=self.peer.config().max_wine_production);
        self.peer
            .transmitter()
            .send(Tag::ProductionEnd, Payload::wine(wine_available), OBSERVER_RANK)?;
        debug!("rank {} produced {wine_available}", self.peer.rank());
        Ok(wine_available)
    }

    // one critical section attempt. the replica is rescanned inside the
    // section: every peer that ACKed us has had its earlier updates delivered
    // first, so the scan is current with respect to every grantor
    fn deliver_wine(&mut self, wine_available: &mut u32) -> anyhow::Result<()> {
        let mut section = self.peer.acquire()?;
        if let Some((safe_place_id, wine_amount)) = section.safe_places.deposit(*wine_available) {
            section.publish(Tag::WinemakerSafePlaceUpdated, safe_place_id, wine_amount)?;
            *wine_available = 0
        }
        self.peer.release(section)
    }

    fn nap(&mut self) {
        let pause = self.rng.gen_range(1..=self.peer.config().max_sleep_time);
        thread::sleep(Duration::from_millis(pause))
    }
}

impl<N: Network> Worker for Winemaker<N> {
    type Net = N;

    fn peer(&self) -> &Arc<Peer<N>> {
        &self.peer
    }

    fn foreground(&mut self) -> anyhow::Result<()> {
        let mut cycle = 0;
        while self.cycles.map_or(true, |cycles| cycle < cycles) {
            let mut wine_available = self.make_wine()?;
            while wine_available > 0 {
                self.deliver_wine(&mut wine_available)?;
                if wine_available > 0 {
                    // every safe place was taken, try again in a while
                    self.nap()
                }
            }
            cycle += 1
        }
        Ok(())
    }
}
