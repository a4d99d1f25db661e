// the scalar Lamport clock every peer carries. one lock, three doors: `tick`
// for a single send, `bracket` for a multi-destination burst, `observe` for
// the receive rule. the bracket holds the lock until dropped, so a burst of N
// messages carries one timestamp and no receive can advance the clock in the
// middle of it; recipients on every link see the same (timestamp, rank) pair,
// which is what keeps the request total order intact

use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct LogicalClock(Mutex<u64>);

impl LogicalClock {
    // single send event
    pub fn tick(&self) -> anyhow::Result<u64> {
        let mut clock = self.lock()?;
        *clock += 1;
        Ok(*clock)
    }

    // open a broadcast bracket: one increment covering every message sent
    // through the returned guard. closing is dropping
    pub fn bracket(&self) -> anyhow::Result<Bracket<'_>> {
        let mut clock = self.lock()?;
        *clock += 1;
        Ok(Bracket(clock))
    }

    // receive event. returns the value the clock had before this message was
    // mixed in; the mutex layer compares request timestamps against it
    pub fn observe(&self, remote: u64) -> anyhow::Result<u64> {
        let mut clock = self.lock()?;
        let prev = *clock;
        *clock = prev.max(remote) + 1;
        Ok(prev)
    }

    pub fn read(&self) -> anyhow::Result<u64> {
        Ok(*self.lock()?)
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, u64>> {
        self.0
            .lock()
            .map_err(|_| anyhow::anyhow!("clock mutex poisoned"))
    }
}

#[derive(Debug)]
pub struct Bracket<'a>(MutexGuard<'a, u64>);

impl Bracket<'_> {
    pub fn timestamp(&self) -> u64 {
        *self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_strictly_increasing() -> anyhow::Result<()> {
        let clock = LogicalClock::default();
        let mut last = 0;
        for _ in 0..10 {
            let value = clock.tick()?;
            assert!(value > last);
            last = value
        }
        Ok(())
    }

    #[test]
    fn observe_takes_max_plus_one() -> anyhow::Result<()> {
        let clock = LogicalClock::default();
        assert_eq!(clock.observe(5)?, 0);
        assert_eq!(clock.read()?, 6);
        // stale remote still advances past the local value
        assert_eq!(clock.observe(2)?, 6);
        assert_eq!(clock.read()?, 7);
        Ok(())
    }

    #[test]
    fn bracket_pins_one_timestamp() -> anyhow::Result<()> {
        let clock = LogicalClock::default();
        clock.tick()?;
        let bracket = clock.bracket()?;
        assert_eq!(bracket.timestamp(), 2);
        assert_eq!(bracket.timestamp(), 2);
        drop(bracket);
        assert_eq!(clock.tick()?, 3);
        Ok(())
    }
}
