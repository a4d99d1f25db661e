// the consumer lifecycle, symmetric to the winemaker's: recover, draw a
// demand, then collect until the demand is met. a single critical section may
// drain several safe places, publishing one assigned update per touched place

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
pub struct Student<N> {
    peer: Arc<Peer<N>>,
    rng: StdRng,
    cycles: Option<u64>,
}

impl<N: Network> Student<N> {
    pub fn new(peer: Arc<Peer<N>>, rng: StdRng) -> Self {
        Self {
            peer,
            rng,
            cycles: None,
        }
    }

    pub fn cycles(mut self, cycles: u64) -> Self {
        self.cycles = Some(cycles);
        self
    }

    fn get_thirsty(&mut self) -> anyhow::Result<u32> {
        self.peer
            .transmitter()
            .send(Tag::NoLongerParties, Payload::default(), OBSERVER_RANK)?;
        self.nap();
        let wine_demand = self.rng.gen_range(1..=self.peer.config().max_wine_demand);
        self.peer
            .transmitter()
            .send(Tag::WantToParty, Payload::wine(wine_demand), OBSERVER_RANK)?;
        debug!("rank {} demands {wine_demand}", self.peer.rank());
        Ok(wine_demand)
    }

    fn collect_wine(&mut self, wine_demand: &mut u32) -> anyhow::Result<()> {
        let mut section = self.peer.acquire()?;
        for (safe_place_id, wine_amount) in section.safe_places.drain(wine_demand) {
            section.publish(Tag::StudentSafePlaceUpdated, safe_place_id, wine_amount)?
        }
        self.peer.release(section)
    }

    fn nap(&mut self) {
        let pause = self.rng.gen_range(1..=self.peer.config().max_sleep_time);
        thread::sleep(Duration::from_millis(pause))
    }
}

impl<N: Network> Worker for Student<N> {
    type Net = N;

    fn peer(&self) -> &Arc<Peer<N>> {
        &self.peer
    }

    fn foreground(&mut self) -> anyhow::Result<()> {
        let mut cycle = 0;
        while self.cycles.map_or(true, |cycles| cycle < cycles) {
            let mut wine_demand = self.get_thirsty()?;
            while wine_demand > 0 {
                self.collect_wine(&mut wine_demand)?;
                if wine_demand > 0 {
                    // nothing left anywhere, wait for the winemakers
                    self.nap()
                }
            }
            cycle += 1
        }
        Ok(())
    }
}
