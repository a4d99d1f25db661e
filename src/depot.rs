// the replicated safe place vector. every worker mirrors the whole vector;
// the wire contract is assignment (the broadcast carries the new amount, not
// a delta), so applying an update is an overwrite and replays are harmless as
// long as the per-pair FIFO holds

use derive_more::Deref;

#[derive(Debug, Clone, PartialEq, Eq, Deref)]
pub struct Depots(Vec<u32>);

impl Depots {
    pub fn new(num_safe_place: usize) -> Self {
        Self(vec![0; num_safe_place])
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|&amount| amount as u64).sum()
    }

    // write-through of a SAFE_PLACE_UPDATED broadcast
    pub fn apply(&mut self, safe_place_id: u32, wine_amount: u32) -> anyhow::Result<()> {
        let slot = self
            .0
            .get_mut(safe_place_id as usize)
            .ok_or_else(|| anyhow::anyhow!("no safe place {safe_place_id}"))?;
        *slot = wine_amount;
        Ok(())
    }

    pub fn first_empty(&self) -> Option<u32> {
        self.0.iter().position(|&amount| amount == 0).map(|i| i as u32)
    }

    // winemaker path: the whole batch goes into the first empty safe place,
    // or nowhere at all until a later attempt
    pub fn deposit(&mut self, wine_amount: u32) -> Option<(u32, u32)> {
        let safe_place_id = self.first_empty()?;
        self.0[safe_place_id as usize] = wine_amount;
        Some((safe_place_id, wine_amount))
    }

    // student path: scan in id order, take min(demand, amount) from every
    // non-empty safe place until the demand is met. returns the assigned
    // (id, new amount) pairs to broadcast
    pub fn drain(&mut self, wine_demand: &mut u32) -> Vec<(u32, u32)> {
        let mut updates = Vec::new();
        for (safe_place_id, amount) in self.0.iter_mut().enumerate() {
            if *wine_demand == 0 {
                break;
            }
            if *amount == 0 {
                continue;
            }
            let quantity = (*wine_demand).min(*amount);
            *amount -= quantity;
            *wine_demand -= quantity;
            updates.push((safe_place_id as u32, *amount))
        }
        updates
    }
}
