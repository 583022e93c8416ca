//! CLI command handling.
//!
//! Provides subcommands for:
//! - Running the supervisor (`run`)
//! - Checking freshly probed service status (`status`)
//! - Stopping the managed container (`stop`)
//! - Tailing container logs (`logs`)
//! - Engine and image diagnostics (`doctor`)
//! - Pre-pulling images (`pull`)

mod doctor;
mod status;

pub use doctor::{Platform, run_doctor_command};
pub use status::run_status_command;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "neuroinsight")]
#[command(about = "Launches and supervises the NeuroInsight MRI analysis service")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the service and supervise it until interrupted (default)
    Run,

    /// Show freshly probed service status
    Status {
        /// Emit machine-readable JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Stop the managed service container
    Stop,

    /// Show the tail of the service container's logs
    Logs {
        /// Number of trailing lines to show
        #[arg(long, default_value_t = 100)]
        tail: u32,
    },

    /// Diagnose the container engine and image availability
    Doctor,

    /// Pre-pull the service image (and optionally the processing image)
    Pull {
        /// Also pull the FreeSurfer processing image
        #[arg(long)]
        freesurfer: bool,
    },
}
