// rank dispatch and cohort startup. a peer that fails breaks the mutex
// protocol for everyone (its outstanding ACKs never arrive), so every fatal
// condition takes the whole process down instead of leaving a limping cohort
// behind, the way MPI_Abort would

use std::{sync::Arc, thread};

use rand::{rngs::StdRng, SeedableRng};
use tracing::error;

use crate::{
    config::{Config, OBSERVER_RANK},
    net::{memory, session, Network, Rank},
    observer::Observer,
    peer::{Peer, Worker},
    student::Student,
    winemaker::Winemaker,
};

pub fn run_rank<N: Network>(rank: Rank, config: Config, net: N) -> anyhow::Result<()> {
    if rank == OBSERVER_RANK {
        Observer::new(config, net).run()
    } else if config.is_winemaker(rank) {
        let peer = Arc::new(Peer::new(rank, config, net));
        Winemaker::new(peer, StdRng::from_entropy()).run()
    } else if config.is_student(rank) {
        let peer = Arc::new(Peer::new(rank, config, net));
        Student::new(peer, StdRng::from_entropy()).run()
    } else {
        anyhow::bail!("rank {rank} outside the cohort")
    }
}

// the whole cohort as threads of one process over the in-process substrate
pub fn run_cohort(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    let mut threads = Vec::new();
    for endpoint in memory::cohort(config.total_processes() as usize) {
        let rank = endpoint.rank();
        let config = config.clone();
        threads.push(
            thread::Builder::new()
                .name(format!("rank-{rank}"))
                .spawn(move || {
                    if let Err(err) = run_rank(rank, config, endpoint) {
                        error!("rank {rank}: {err:?}");
                        std::process::exit(1)
                    }
                })?,
        )
    }
    for thread in threads {
        thread
            .join()
            .map_err(|_| anyhow::anyhow!("peer thread panicked"))?
    }
    Ok(())
}

// one rank of a multi-process cohort over the TCP mesh
pub fn run_tcp(rank: Rank, config: Config) -> anyhow::Result<()> {
    config.validate()?;
    anyhow::ensure!(
        config.peers.len() == config.total_processes() as usize,
        "expect {} peer addresses, got {}",
        config.total_processes(),
        config.peers.len()
    );
    let net = session::Tcp::bind(rank, config.peers.clone())?;
    run_rank(rank, config, net)
}
