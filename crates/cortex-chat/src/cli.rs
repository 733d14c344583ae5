use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cortex-chat",
    version,
    about = "Talk to a Snowflake Cortex agent and manage its conversation threads."
)]
pub struct Cli {
    /// Config file (default: $CORTEX_CONFIG > ~/.cortex/cortex.toml).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage conversation threads.
    #[command(subcommand)]
    Threads(ThreadsCommand),

    /// Send one message and stream the answer.
    Ask {
        /// Continue this thread instead of starting a stateless run.
        #[arg(long, value_name = "ID")]
        thread: Option<String>,

        /// Also print every raw event to stderr.
        #[arg(long)]
        events: bool,

        message: String,
    },

    /// Interactive conversation on stdin.
    Chat {
        /// Resume this thread.
        #[arg(long, value_name = "ID")]
        thread: Option<String>,

        /// Warn after this many seconds without a chunk; give up after twice that.
        #[arg(long, default_value_t = 30, value_name = "SECS")]
        idle_warn_secs: u64,
    },
}

#[derive(Subcommand)]
pub enum ThreadsCommand {
    /// List threads for the configured origin application.
    List {
        #[arg(long, default_value_t = 20)]
        limit: u32,

        /// Origin application filter (default: from config).
        #[arg(long, value_name = "APP")]
        origin: Option<String>,

        /// Do not filter by origin application.
        #[arg(long, conflicts_with = "origin")]
        all: bool,
    },

    /// Create an empty thread and print its id.
    Create,

    /// Print a thread's messages, oldest first.
    Show {
        id: String,

        #[arg(long, default_value_t = 50)]
        page_size: u32,
    },

    Delete {
        id: String,
    },
}
