// in-process substrate: the whole cohort lives in one OS process and every
// rank gets an endpoint wired to every other rank over std channels. per-
// sender ordering is the channel contract, which is exactly the FIFO-per-pair
// guarantee the protocol asks of the substrate

use std::sync::{
    mpsc::{channel, Receiver, Sender, TryRecvError},
    Mutex,
};

use crate::{
    message::Frame,
    net::{Network, Rank},
};

#[derive(Debug)]
pub struct Endpoint {
    rank: Rank,
    peers: Vec<Sender<(Rank, Frame)>>,
    inbox: Mutex<Receiver<(Rank, Frame)>>,
}

// build the fully connected mesh, one endpoint per rank
pub fn cohort(num_process: usize) -> Vec<Endpoint> {
    let (senders, inboxes): (Vec<_>, Vec<_>) = (0..num_process).map(|_| channel()).unzip();
    inboxes
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| Endpoint {
            rank: rank as Rank,
            peers: senders.clone(),
            inbox: Mutex::new(inbox),
        })
        .collect()
}

impl Endpoint {
    pub fn rank(&self) -> Rank {
        self.rank
    }

    // non-blocking probe, for draining a quiescent cohort
    pub fn try_recv(&self) -> anyhow::Result<Option<(Rank, Frame)>> {
        match self.lock()?.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => anyhow::bail!("every peer hung up"),
        }
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Receiver<(Rank, Frame)>>> {
        self.inbox
            .lock()
            .map_err(|_| anyhow::anyhow!("inbox mutex poisoned"))
    }
}

impl Network for Endpoint {
    fn send(&self, dest: Rank, frame: Frame) -> anyhow::Result<()> {
        let sender = self
            .peers
            .get(dest as usize)
            .ok_or_else(|| anyhow::anyhow!("no rank {dest} in the cohort"))?;
        sender
            .send((self.rank, frame))
            .map_err(|_| anyhow::anyhow!("rank {dest} hung up"))
    }

    fn recv(&self) -> anyhow::Result<(Rank, Frame)> {
        self.lock()?
            .recv()
            .map_err(|_| anyhow::anyhow!("every peer hung up"))
    }
}
