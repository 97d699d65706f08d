use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use pixicast_proto::protocol::Platform;

#[derive(Parser)]
#[command(name = "pixicast")]
#[command(about = "Pixicast timeline and channel search from the terminal")]
#[command(version)]
pub struct Cli {
    /// Config file (default: ~/.config/pixicast/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Print state as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the merged timeline, grouped by day
    Timeline {
        /// Only this channel instead of every enabled subscription
        #[arg(short, long)]
        channel: Option<String>,

        /// Number of pages to fetch
        #[arg(short, long, default_value = "1")]
        pages: usize,

        /// Reference date (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Search channels
    Search {
        query: String,

        /// youtube, twitch, podcast or radiko
        #[arg(short, long)]
        platform: Option<Platform>,
    },

    /// Popular channels
    Popular,

    /// Recently issued searches
    Recent {
        /// Forget them instead
        #[arg(long)]
        clear: bool,
    },

    /// List subscriptions
    Subscriptions,

    /// Subscribe to a channel by URL, handle or id
    Subscribe { platform: Platform, input: String },

    /// Remove a subscription
    Unsubscribe { channel_id: String },

    /// Mark a subscription as favorite
    Favorite {
        channel_id: String,

        /// Unmark instead
        #[arg(long)]
        off: bool,
    },

    /// Account and plan details
    Me,
}
