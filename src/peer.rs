// the peer coordination core: a Ricart-Agrawala style mutex over the
// replicated safe place vector. the foreground worker calls `acquire`, runs
// its critical section against the returned guard and calls `release`; the
// background receiver runs `run_receiver`, which dispatches every incoming
// message under the one state mutex. the single condition variable is
// signalled exactly when `ack_counter` reaches zero, the only thing the
// foreground ever waits for

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex, MutexGuard},
    thread,
};

use tracing::{debug, error};

use crate::{
    config::{Config, OBSERVER_RANK},
    depot::Depots,
    message::{Payload, Response, Tag},
    net::{Network, Rank},
    transmitter::Transmitter,
};

#[derive(Debug)]
pub struct PeerState {
    pub want_to_enter_critical_section: bool,
    pub ack_counter: u32,
    pub pending_deferrals: VecDeque<Rank>,
    pub safe_places: Depots,
    // the timestamp the current REQUEST broadcast carried
    pub request_ts: u64,
    pub cs_entries: u64,
}

#[derive(Debug)]
pub struct Peer<N> {
    rank: Rank,
    config: Config,
    transmitter: Transmitter<N>,
    state: Mutex<PeerState>,
    cs_ready: Condvar,
}

impl<N: Network> Peer<N> {
    pub fn new(rank: Rank, config: Config, net: N) -> Self {
        let state = PeerState {
            want_to_enter_critical_section: false,
            ack_counter: 0,
            pending_deferrals: VecDeque::new(),
            safe_places: Depots::new(config.safe_places as usize),
            request_ts: 0,
            cs_entries: 0,
        };
        Self {
            rank,
            config,
            transmitter: Transmitter::new(net),
            state: Mutex::new(state),
            cs_ready: Condvar::new(),
        }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transmitter(&self) -> &Transmitter<N> {
        &self.transmitter
    }

    // entry: raise the want flag, arm the counter, REQUEST everyone in one
    // bracket, then sleep on the condition until the last ACK lands. the
    // state mutex is held up to the wait and reacquired by it
    pub fn acquire(&self) -> anyhow::Result<CriticalSection<'_, N>> {
        let mut state = self.lock()?;
        anyhow::ensure!(
            !state.want_to_enter_critical_section,
            "concurrent request from rank {}",
            self.rank
        );
        state.want_to_enter_critical_section = true;
        state.ack_counter = self.config.workers() - 1;
        let broadcast = self.transmitter.broadcast()?;
        state.request_ts = broadcast.timestamp();
        for rank in self.config.worker_ranks() {
            if rank != self.rank {
                broadcast.send(Tag::Request, Payload::default(), rank)?
            }
        }
        drop(broadcast);
        debug!("rank {} requesting at {}", self.rank, state.request_ts);
        let mut state = self
            .cs_ready
            .wait_while(state, |state| state.ack_counter > 0)
            .map_err(|_| anyhow::anyhow!("state mutex poisoned"))?;
        state.cs_entries += 1;
        debug!("rank {} entered the critical section", self.rank);
        Ok(CriticalSection { state, peer: self })
    }

    // exit: lower the want flag and ACK every deferred requester, one ticked
    // send each. consuming the guard drops the state mutex at the end
    pub fn release(&self, mut section: CriticalSection<'_, N>) -> anyhow::Result<()> {
        section.state.want_to_enter_critical_section = false;
        let mut released = 0;
        while let Some(rank) = section.state.pending_deferrals.pop_front() {
            self.transmitter.send(Tag::Ack, Payload::default(), rank)?;
            released += 1
        }
        debug!(
            "rank {} left the critical section, released {released}",
            self.rank
        );
        Ok(())
    }

    // one message, under the state lock
    pub fn dispatch(&self, response: Response) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        match response.tag {
            Tag::Request => {
                anyhow::ensure!(
                    response.timestamp > 0,
                    "REQUEST from rank {} carries zero timestamp",
                    response.source
                );
                // grant when we are not competing or when the opponent's
                // (ts, rank) request pair is smaller than ours; otherwise
                // hold the reply until exit. the comparison basis is the
                // timestamp our own REQUEST broadcast carried, not the clock
                // as it has drifted since: granting anything that merely
                // predates the drifted clock would let a later request slip
                // past a waiting earlier one
                let granted = !state.want_to_enter_critical_section
                    || response.timestamp < state.request_ts
                    || (response.timestamp == state.request_ts && response.source < self.rank);
                if granted {
                    self.transmitter
                        .send(Tag::Ack, Payload::default(), response.source)?
                } else {
                    debug!(
                        "rank {} defers rank {} ({} vs {} at prev {})",
                        self.rank,
                        response.source,
                        response.timestamp,
                        state.request_ts,
                        response.prev_clock
                    );
                    state.pending_deferrals.push_back(response.source)
                }
            }
            Tag::Ack => {
                anyhow::ensure!(
                    state.ack_counter > 0,
                    "stray ACK from rank {} at rank {}",
                    response.source,
                    self.rank
                );
                state.ack_counter -= 1;
                if state.ack_counter == 0 {
                    self.cs_ready.notify_one()
                }
            }
            Tag::SafePlaceUpdated => state
                .safe_places
                .apply(response.payload.safe_place_id, response.payload.wine_amount)?,
            tag => anyhow::bail!("unexpected {tag:?} at worker rank {}", self.rank),
        }
        Ok(())
    }

    // the background half of every worker
    pub fn run_receiver(&self) -> anyhow::Result<()> {
        loop {
            let response = self.transmitter.receive()?;
            self.dispatch(response)?
        }
    }

    pub fn cs_entries(&self) -> anyhow::Result<u64> {
        Ok(self.lock()?.cs_entries)
    }

    pub fn pending_deferrals(&self) -> anyhow::Result<usize> {
        Ok(self.lock()?.pending_deferrals.len())
    }

    pub fn safe_places(&self) -> anyhow::Result<Vec<u32>> {
        Ok(self.lock()?.safe_places.to_vec())
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, PeerState>> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("state mutex poisoned"))
    }
}

// the critical section: exclusive access to the peer state for the body that
// mutates the safe places and publishes the results
#[derive(Debug, derive_more::Deref, derive_more::DerefMut)]
pub struct CriticalSection<'a, N> {
    #[deref(forward)]
    #[deref_mut(forward)]
    state: MutexGuard<'a, PeerState>,
    peer: &'a Peer<N>,
}

impl<N: Network> CriticalSection<'_, N> {
    // observer notice plus worker fan-out for one safe place, all of it under
    // one broadcast bracket so the burst carries one timestamp
    pub fn publish(
        &self,
        observer_tag: Tag,
        safe_place_id: u32,
        wine_amount: u32,
    ) -> anyhow::Result<()> {
        let payload = Payload::update(safe_place_id, wine_amount);
        let broadcast = self.peer.transmitter.broadcast()?;
        broadcast.send(observer_tag, payload, OBSERVER_RANK)?;
        for rank in self.peer.config.worker_ranks() {
            if rank != self.peer.rank {
                broadcast.send(Tag::SafePlaceUpdated, payload, rank)?
            }
        }
        Ok(())
    }
}

// a worker peer is one foreground lifecycle loop plus the shared receiver;
// the blanket `run` wires them together. the receiver thread must not die
// quietly: a worker that stops acknowledging strands every other peer, so a
// receiver failure takes the whole cohort down
pub trait Worker: Sized {
    type Net: Network;

    fn peer(&self) -> &Arc<Peer<Self::Net>>;

    fn foreground(&mut self) -> anyhow::Result<()>;

    fn run(mut self) -> anyhow::Result<()> {
        let peer = self.peer().clone();
        thread::Builder::new()
            .name(format!("receiver-{}", peer.rank()))
            .spawn(move || {
                if let Err(err) = peer.run_receiver() {
                    error!("rank {} receiver: {err:?}", peer.rank());
                    std::process::exit(1)
                }
            })?;
        self.foreground()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{
        message::Frame,
        net::memory::{self, Endpoint},
    };

    use super::*;

    fn config() -> Config {
        Config {
            winemakers: 1,
            students: 1,
            safe_places: 2,
            max_sleep_time: 5,
            ..Default::default()
        }
    }

    fn request(source: Rank, timestamp: u64, prev_clock: u64) -> Response {
        Response {
            tag: Tag::Request,
            source,
            timestamp,
            prev_clock,
            payload: Payload::default(),
        }
    }

    fn ack(source: Rank) -> Response {
        Response {
            tag: Tag::Ack,
            source,
            timestamp: 1,
            prev_clock: 0,
            payload: Payload::default(),
        }
    }

    // test plays ranks 0 and 2 against a peer at rank 1
    fn rig() -> (Arc<Peer<Endpoint>>, Endpoint, Endpoint) {
        let mut endpoints = memory::cohort(3);
        let other = endpoints.pop().unwrap();
        let peer = Arc::new(Peer::new(1, config(), endpoints.pop().unwrap()));
        let observer = endpoints.pop().unwrap();
        (peer, observer, other)
    }

    #[test]
    fn idle_peer_grants_immediately() -> anyhow::Result<()> {
        let (peer, _observer, other) = rig();
        peer.dispatch(request(2, 5, 0))?;
        let (source, frame) = other.try_recv()?.expect("an ACK");
        assert_eq!(source, 1);
        assert_eq!(frame.tag, Tag::Ack);
        Ok(())
    }

    #[test]
    fn requesting_peer_defers_the_larger_pair_until_exit() -> anyhow::Result<()> {
        let (peer, _observer, other) = rig();
        let handle = {
            let peer = peer.clone();
            thread::spawn(move || -> anyhow::Result<()> {
                let section = peer.acquire()?;
                thread::sleep(Duration::from_millis(10));
                peer.release(section)
            })
        };
        // our REQUEST goes out with timestamp 1
        let (_, frame) = other.recv()?;
        assert_eq!(frame.tag, Tag::Request);
        assert_eq!(frame.timestamp, 1);
        // an equal pair from a larger rank loses the tie and is withheld
        peer.dispatch(request(2, 1, 1))?;
        assert!(other.try_recv()?.is_none());
        // the last ACK lets the worker in; exit releases the deferral
        peer.dispatch(ack(2))?;
        handle.join().unwrap()?;
        let (_, frame) = other.recv()?;
        assert_eq!(frame.tag, Tag::Ack);
        assert!(other.try_recv()?.is_none());
        assert_eq!(peer.cs_entries()?, 1);
        Ok(())
    }

    #[test]
    fn requesting_peer_grants_the_smaller_pair() -> anyhow::Result<()> {
        let (peer, _observer, other) = rig();
        // push the clock forward so our own REQUEST is stamped late
        other.send(
            1,
            Frame {
                tag: Tag::SafePlaceUpdated,
                timestamp: 5,
                payload: Payload::update(0, 2),
            },
        )?;
        peer.dispatch(peer.transmitter().receive()?)?;
        let handle = {
            let peer = peer.clone();
            thread::spawn(move || -> anyhow::Result<()> {
                let section = peer.acquire()?;
                peer.release(section)
            })
        };
        let (_, frame) = other.recv()?;
        assert_eq!(frame.tag, Tag::Request);
        assert_eq!(frame.timestamp, 7);
        // the opponent requested before us, it wins and gets the reply
        // straight away even though we are still waiting
        peer.dispatch(request(2, 3, 4))?;
        let (_, frame) = other.recv()?;
        assert_eq!(frame.tag, Tag::Ack);
        peer.dispatch(ack(2))?;
        handle.join().unwrap()?;
        // nothing was deferred, so nothing more is sent at exit
        assert!(other.try_recv()?.is_none());
        Ok(())
    }

    #[test]
    fn publish_bundles_observer_and_workers_under_one_timestamp() -> anyhow::Result<()> {
        let (peer, observer, other) = rig();
        let handle = {
            let peer = peer.clone();
            thread::spawn(move || -> anyhow::Result<()> {
                let mut section = peer.acquire()?;
                let (safe_place_id, wine_amount) =
                    section.safe_places.deposit(3).expect("an empty safe place");
                section.publish(Tag::WinemakerSafePlaceUpdated, safe_place_id, wine_amount)?;
                peer.release(section)
            })
        };
        let (_, request_frame) = other.recv()?;
        peer.dispatch(ack(2))?;
        handle.join().unwrap()?;
        let (_, to_observer) = observer.recv()?;
        let (_, to_worker) = other.recv()?;
        assert_eq!(to_observer.tag, Tag::WinemakerSafePlaceUpdated);
        assert_eq!(to_worker.tag, Tag::SafePlaceUpdated);
        assert_eq!(to_observer.payload, Payload::update(0, 3));
        assert_eq!(to_worker.payload, to_observer.payload);
        assert_eq!(to_worker.timestamp, to_observer.timestamp);
        assert!(to_worker.timestamp > request_frame.timestamp);
        assert_eq!(peer.safe_places()?, [3, 0]);
        Ok(())
    }

    #[test]
    fn update_writes_through_the_replica() -> anyhow::Result<()> {
        let (peer, _observer, _other) = rig();
        peer.dispatch(Response {
            tag: Tag::SafePlaceUpdated,
            source: 2,
            timestamp: 4,
            prev_clock: 0,
            payload: Payload::update(1, 9),
        })?;
        assert_eq!(peer.safe_places()?, [0, 9]);
        Ok(())
    }

    #[test]
    fn protocol_violations_are_fatal() {
        let (peer, _observer, _other) = rig();
        // stray ACK with no request in flight
        assert!(peer.dispatch(ack(2)).is_err());
        // zero REQUEST timestamp
        assert!(peer.dispatch(request(2, 0, 0)).is_err());
        // update aimed past the vector
        assert!(peer
            .dispatch(Response {
                tag: Tag::SafePlaceUpdated,
                source: 2,
                timestamp: 4,
                prev_clock: 0,
                payload: Payload::update(7, 1),
            })
            .is_err());
        // observer-directed event at a worker
        assert!(peer
            .dispatch(Response {
                tag: Tag::WantToParty,
                source: 2,
                timestamp: 4,
                prev_clock: 0,
                payload: Payload::wine(1),
            })
            .is_err());
    }
}
