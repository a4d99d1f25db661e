// the substrate seam. both implementations deliver reliably and FIFO per
// ordered pair of ranks, which the mutex layer depends on: an ACK from a peer
// implies that peer's earlier SAFE_PLACE_UPDATED broadcasts have been
// delivered already

use bincode::Options;
use bytes::Bytes;

use crate::message::Frame;

pub type Rank = u32;

pub trait Network: Send + Sync + 'static {
    // one-way, non-blocking, callable from both peer threads
    fn send(&self, dest: Rank, frame: Frame) -> anyhow::Result<()>;

    // blocking wildcard receive: any source, any tag
    fn recv(&self) -> anyhow::Result<(Rank, Frame)>;
}

pub fn serialize(frame: &Frame) -> anyhow::Result<Bytes> {
    Ok(bincode::options().serialize(frame)?.into())
}

pub fn deserialize(buf: &[u8]) -> anyhow::Result<Frame> {
    Ok(bincode::options().deserialize(buf)?)
}

pub mod memory;
pub mod session;
