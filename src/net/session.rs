// TCP mesh substrate for running the cohort as separate processes. a tokio
// runtime owns all socket tasks; the peer threads stay synchronous and talk
// to them over channels. every rank dials one stream to every other rank and
// uses it for egress only, announcing itself with a preamble, so each
// direction of a pair rides its own connection and stays FIFO on its own.
// frames are u64 length-prefixed bincode

use std::{io::ErrorKind, net::SocketAddr, sync::Mutex, time::Duration};

use bytes::Bytes;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    runtime,
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    time::sleep,
};
use tracing::warn;

use crate::{
    message::Frame,
    net::{deserialize, serialize, Network, Rank},
};

const MAX_FRAME_LEN: usize = 1 << 16;

const CONNECT_RETRY: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct Tcp {
    egress: Vec<Option<UnboundedSender<Bytes>>>,
    ingress: Mutex<UnboundedReceiver<(Rank, Frame)>>,
    _runtime: runtime::Runtime,
}

impl Tcp {
    pub fn bind(rank: Rank, addrs: Vec<SocketAddr>) -> anyhow::Result<Self> {
        let addr = *addrs
            .get(rank as usize)
            .ok_or_else(|| anyhow::anyhow!("no address for rank {rank}"))?;
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let (ingress_sender, ingress) = unbounded_channel();
        let listener = runtime.block_on(TcpListener::bind(addr))?;
        runtime.spawn(accept_session(listener, ingress_sender));
        let mut egress = Vec::new();
        for (peer, peer_addr) in addrs.iter().enumerate() {
            if peer as Rank == rank {
                egress.push(None);
                continue;
            }
            let (sender, receiver) = unbounded_channel();
            runtime.spawn(write_session(*peer_addr, rank, receiver));
            egress.push(Some(sender))
        }
        Ok(Self {
            egress,
            ingress: Mutex::new(ingress),
            _runtime: runtime,
        })
    }
}

async fn accept_session(listener: TcpListener, sender: UnboundedSender<(Rank, Frame)>) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("accept {err}");
                continue;
            }
        };
        let sender = sender.clone();
        tokio::spawn(async move {
            if let Err(err) = read_session(stream, sender).await {
                warn!("<<< {peer_addr} {err}")
            }
        });
    }
}

async fn read_session(
    mut stream: TcpStream,
    sender: UnboundedSender<(Rank, Frame)>,
) -> anyhow::Result<()> {
    stream.set_nodelay(true)?;
    let remote = stream.read_u32().await?;
    loop {
        let len = match stream.read_u64().await {
            Ok(len) => len as usize,
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        anyhow::ensure!(len <= MAX_FRAME_LEN, "invalid frame length {len}");
        let mut buf = vec![0; len];
        stream.read_exact(&mut buf).await?;
        sender
            .send((remote, deserialize(&buf)?))
            .map_err(|_| anyhow::anyhow!("ingress closed"))?
    }
}

async fn write_session(addr: SocketAddr, rank: Rank, mut receiver: UnboundedReceiver<Bytes>) {
    // the cohort boots in arbitrary order, keep dialing until the peer is up
    let mut stream = loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => break stream,
            Err(_) => sleep(CONNECT_RETRY).await,
        }
    };
    let task = async {
        stream.set_nodelay(true)?;
        stream.write_u32(rank).await?;
        while let Some(buf) = receiver.recv().await {
            stream.write_u64(buf.len() as _).await?;
            stream.write_all(&buf).await?;
            stream.flush().await?
        }
        anyhow::Result::<_>::Ok(())
    };
    if let Err(err) = task.await {
        warn!(">>> {addr} {err}")
    }
}

impl Network for Tcp {
    fn send(&self, dest: Rank, frame: Frame) -> anyhow::Result<()> {
        let Some(Some(sender)) = self.egress.get(dest as usize) else {
            anyhow::bail!("no egress for rank {dest}")
        };
        sender
            .send(serialize(&frame)?)
            .map_err(|_| anyhow::anyhow!("write session for rank {dest} exited"))
    }

    fn recv(&self) -> anyhow::Result<(Rank, Frame)> {
        self.ingress
            .lock()
            .map_err(|_| anyhow::anyhow!("ingress mutex poisoned"))?
            .blocking_recv()
            .ok_or_else(|| anyhow::anyhow!("ingress closed"))
    }
}
