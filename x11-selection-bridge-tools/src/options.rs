use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "x11-selection-bridge",
    version,
    about = "Share the X11 clipboard and primary selection with a host agent."
)]
pub struct Options {
    /// X11 display to connect to
    ///
    /// By default the display named by the DISPLAY environment variable is used.
    #[arg(long, short)]
    pub display: Option<String>,

    /// Path of the agent socket
    #[arg(
        long,
        short,
        value_name = "PATH",
        default_value = "/run/x11-selection-bridge/agent.sock"
    )]
    pub socket: PathBuf,

    /// Enable verbose logging
    ///
    /// Can be repeated for more detail.
    #[arg(long, short, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
