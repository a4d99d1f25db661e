use bacchus::{boot, config::Config};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    // with a rank in the environment this process is one peer of a TCP mesh
    // cohort; without one it hosts the whole cohort in-process
    match std::env::var("BACCHUS_RANK") {
        Ok(rank) => boot::run_tcp(rank.parse()?, config),
        Err(_) => boot::run_cohort(config),
    }
}
