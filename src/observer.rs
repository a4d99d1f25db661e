// rank 0: the sink of every status event and the only process that talks to
// the operator. the view aggregates what the events imply (who is working,
// who is resting, what every safe place holds, how much got produced and
// drunk so far) and prints a line per event plus the state table. the wire
// contract for safe place updates is assignment, so every operator-facing
// delta is derived from two consecutive assigned amounts

use crate::{
    config::Config,
    message::{Payload, Tag},
    net::{Network, Rank},
    transmitter::Transmitter,
};

#[derive(Debug)]
pub struct View {
    config: Config,
    winemakers_wine_amounts: Vec<u32>,
    students_wine_needs: Vec<u32>,
    safe_places_wine_amounts: Vec<u32>,
    winemakers_working: Vec<bool>,
    students_resting: Vec<bool>,
    free_safe_places: u32,
    produced_total: u64,
    consumed_total: u64,
}

impl View {
    pub fn new(config: Config) -> Self {
        Self {
            winemakers_wine_amounts: vec![0; config.winemakers as usize],
            students_wine_needs: vec![0; config.students as usize],
            safe_places_wine_amounts: vec![0; config.safe_places as usize],
            winemakers_working: vec![false; config.winemakers as usize],
            students_resting: vec![false; config.students as usize],
            free_safe_places: config.safe_places,
            produced_total: 0,
            consumed_total: 0,
            config,
        }
    }

    pub fn apply(&mut self, tag: Tag, source: Rank, payload: Payload) -> anyhow::Result<()> {
        match tag {
            Tag::ProductionStarted => {
                let wid = self.config.winemaker_index(source)? as usize;
                self.winemakers_working[wid] = true;
                println!("Winemaker {} started production", wid + 1)
            }
            Tag::ProductionEnd => {
                let wid = self.config.winemaker_index(source)? as usize;
                self.winemakers_working[wid] = false;
                self.winemakers_wine_amounts[wid] = payload.wine_amount;
                self.produced_total += payload.wine_amount as u64;
                println!(
                    "Winemaker {} finished production with {} units of wine",
                    wid + 1,
                    payload.wine_amount
                )
            }
            Tag::NoLongerParties => {
                let sid = self.config.student_index(source)? as usize;
                self.students_resting[sid] = true;
                println!("Student {} is hungover", sid + 1)
            }
            Tag::WantToParty => {
                let sid = self.config.student_index(source)? as usize;
                self.students_resting[sid] = false;
                self.students_wine_needs[sid] = payload.wine_amount;
                println!(
                    "Student {} recovered and needs {} units of wine for the next party",
                    sid + 1,
                    payload.wine_amount
                )
            }
            Tag::WinemakerSafePlaceUpdated => {
                let wid = self.config.winemaker_index(source)? as usize;
                let held = self.slot(payload.safe_place_id)?;
                anyhow::ensure!(
                    payload.wine_amount >= held,
                    "deposit shrank safe place {}",
                    payload.safe_place_id
                );
                let increase = payload.wine_amount - held;
                if held == 0 && increase > 0 {
                    self.free_safe_places -= 1
                }
                self.safe_places_wine_amounts[payload.safe_place_id as usize] =
                    payload.wine_amount;
                self.winemakers_wine_amounts[wid] =
                    self.winemakers_wine_amounts[wid].saturating_sub(increase);
                println!(
                    "Winemaker {} delivered {} units of wine to safe place {}",
                    wid + 1,
                    increase,
                    payload.safe_place_id + 1
                );
                println!("{} safe places are now free", self.free_safe_places)
            }
            Tag::StudentSafePlaceUpdated => {
                let sid = self.config.student_index(source)? as usize;
                let held = self.slot(payload.safe_place_id)?;
                anyhow::ensure!(
                    payload.wine_amount <= held,
                    "withdrawal grew safe place {}",
                    payload.safe_place_id
                );
                let decrease = held - payload.wine_amount;
                self.safe_places_wine_amounts[payload.safe_place_id as usize] =
                    payload.wine_amount;
                self.students_wine_needs[sid] =
                    self.students_wine_needs[sid].saturating_sub(decrease);
                self.consumed_total += decrease as u64;
                if payload.wine_amount == 0 && decrease > 0 {
                    self.free_safe_places += 1
                }
                println!(
                    "Student {} took {} units of wine from safe place {}",
                    sid + 1,
                    decrease,
                    payload.safe_place_id + 1
                );
                println!("{} safe places are now free", self.free_safe_places)
            }
            tag => anyhow::bail!("unexpected {tag:?} at the observer"),
        }
        Ok(())
    }

    pub fn render(&self) {
        println!("Current state:");
        let identifiers_number = self
            .config
            .safe_places
            .max(self.config.winemakers)
            .max(self.config.students);
        print!("\tId:         \t");
        for i in 0..identifiers_number {
            print!("{}\t", i + 1)
        }
        println!();
        println!("------------------------------------------------");
        print!("\tWinemakers: \t");
        for (amount, working) in self
            .winemakers_wine_amounts
            .iter()
            .zip(&self.winemakers_working)
        {
            if *working {
                print!("W\t")
            } else {
                print!("{amount}\t")
            }
        }
        println!();
        print!("\tSafe places:\t");
        for amount in &self.safe_places_wine_amounts {
            print!("{amount}\t")
        }
        println!();
        print!("\tStudents:   \t");
        for (need, resting) in self.students_wine_needs.iter().zip(&self.students_resting) {
            if *resting {
                print!("R\t")
            } else {
                print!("{need}\t")
            }
        }
        println!()
    }

    pub fn produced_total(&self) -> u64 {
        self.produced_total
    }

    pub fn consumed_total(&self) -> u64 {
        self.consumed_total
    }

    pub fn wine_in_safe_places(&self) -> u64 {
        self.safe_places_wine_amounts
            .iter()
            .map(|&amount| amount as u64)
            .sum()
    }

    pub fn free_safe_places(&self) -> u32 {
        self.free_safe_places
    }

    fn slot(&self, safe_place_id: u32) -> anyhow::Result<u32> {
        self.safe_places_wine_amounts
            .get(safe_place_id as usize)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no safe place {safe_place_id}"))
    }
}

#[derive(Debug)]
pub struct Observer<N> {
    transmitter: Transmitter<N>,
    view: View,
}

impl<N: Network> Observer<N> {
    pub fn new(config: Config, net: N) -> Self {
        Self {
            transmitter: Transmitter::new(net),
            view: View::new(config),
        }
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let response = self.transmitter.receive()?;
            self.view
                .apply(response.tag, response.source, response.payload)?;
            self.view.render();
            println!()
        }
    }
}
