mod annotations;
mod branch;
mod cli;
mod cmd;
mod git;
mod github;
mod identity;
mod logger;
mod workflow;

use anyhow::Result;
use tracing::{error, info};

fn main() -> Result<()> {
    logger::init()?;
    info!("pullsmith start");

    match cli::run() {
        Ok(result) => {
            info!("pullsmith finished successfully");
            Ok(result)
        }
        Err(err) => {
            error!(error = ?err, "pullsmith failed");
            Err(err)
        }
    }
}
