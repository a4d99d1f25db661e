use std::{net::SocketAddr, ops::RangeInclusive, path::Path};

use serde::Deserialize;

use crate::net::Rank;

pub const OBSERVER_RANK: Rank = 0;

// counts and bounds of the exercise. ranks partition as observer 0,
// winemakers 1..=W, students W+1..=W+S; the launcher must start exactly
// 1 + W + S peers. `max_sleep_time` is in milliseconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    // recognized for completeness, the protocol supports exactly one
    pub observers: u32,
    pub winemakers: u32,
    pub students: u32,
    pub safe_places: u32,
    pub max_wine_production: u32,
    pub max_wine_demand: u32,
    pub max_sleep_time: u64,
    // only consulted by the TCP session substrate, one address per rank
    pub peers: Vec<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            observers: 1,
            winemakers: 10,
            students: 20,
            safe_places: 5,
            max_wine_production: 10,
            max_wine_demand: 10,
            max_sleep_time: 1000,
            peers: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config = serde_json::from_str::<Self>(&std::fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.observers == 1, "expect exactly one observer");
        anyhow::ensure!(self.winemakers >= 1, "expect at least one winemaker");
        anyhow::ensure!(self.students >= 1, "expect at least one student");
        anyhow::ensure!(self.safe_places >= 1, "expect at least one safe place");
        anyhow::ensure!(self.max_wine_production >= 1, "zero max_wine_production");
        anyhow::ensure!(self.max_wine_demand >= 1, "zero max_wine_demand");
        anyhow::ensure!(self.max_sleep_time >= 1, "zero max_sleep_time");
        Ok(())
    }

    pub fn total_processes(&self) -> u32 {
        self.observers + self.winemakers + self.students
    }

    pub fn workers(&self) -> u32 {
        self.winemakers + self.students
    }

    pub fn worker_ranks(&self) -> RangeInclusive<Rank> {
        1..=self.workers()
    }

    pub fn is_winemaker(&self, rank: Rank) -> bool {
        (1..=self.winemakers).contains(&rank)
    }

    pub fn is_student(&self, rank: Rank) -> bool {
        rank > self.winemakers && rank <= self.workers()
    }

    pub fn winemaker_index(&self, rank: Rank) -> anyhow::Result<u32> {
        anyhow::ensure!(self.is_winemaker(rank), "rank {rank} is not a winemaker");
        Ok(rank - 1)
    }

    pub fn student_index(&self, rank: Rank) -> anyhow::Result<u32> {
        anyhow::ensure!(self.is_student(rank), "rank {rank} is not a student");
        Ok(rank - 1 - self.winemakers)
    }
}
