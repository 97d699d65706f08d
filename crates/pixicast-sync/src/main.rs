use anyhow::{bail, Context};
use chrono::Local;
use clap::Parser;
use pixicast_proto::config::Config;
use pixicast_proto::platform;
use pixicast_proto::recent::RecentSearches;
use pixicast_proto::store::JsonFileStore;
use pixicast_sync::api::{ChannelDirectory, ChannelSearch};
use pixicast_sync::auth::{EnvToken, TokenProvider};
use pixicast_sync::search::SearchSettings;
use pixicast_sync::{ApiClient, ChannelScope, SearchCoordinator, TimelineAggregator};
use serde::Serialize;

mod args;
use args::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => Config::load().unwrap_or_default(),
    };
    if let Some(url) = cli.base_url {
        config.api.base_url = url;
    }
    let client = ApiClient::new(&config.api)?;
    tracing::info!("pixicast starting against {}", client.base_url());

    let tokens = EnvToken::new(config.auth.token_env.clone());
    let recent = || {
        let store = JsonFileStore::open(&config.paths.store_file);
        tracing::debug!("recent searches stored in {}", store.path().display());
        RecentSearches::with_capacity(store, config.recent.capacity)
    };

    match cli.command {
        Commands::Timeline {
            channel,
            pages,
            date,
        } => {
            let scope = channel.map_or(ChannelScope::AllSubscriptions, ChannelScope::Channel);
            let as_of = date.unwrap_or_else(|| Local::now().date_naive());
            let timeline =
                TimelineAggregator::with_page_size(client, tokens, config.timeline.page_size);

            let mut state = timeline.load_initial(scope, as_of).await;
            for _ in 1..pages {
                if !state.has_more {
                    break;
                }
                state = timeline.load_more().await;
            }

            if cli.json {
                return print_json(&state);
            }
            if let Some(error) = &state.error {
                bail!("timeline failed: {}", error);
            }
            for group in &state.grouped_by_date {
                println!("== {} ==", group.date_key);
                for p in &group.programs {
                    let time = p
                        .effective_time()
                        .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
                        .unwrap_or_else(|| "--:--".to_string());
                    let live = if p.is_live { " (LIVE)" } else { "" };
                    println!(
                        "  {}  [{}] {}: {}{}",
                        time, p.platform_name, p.channel_title, p.title, live
                    );
                }
            }
            if state.has_more {
                println!("(more available, use --pages)");
            }
        }

        Commands::Search { query, platform } => {
            let search = SearchCoordinator::new(
                client,
                tokens,
                recent(),
                SearchSettings::from(&config.search),
            );
            search.set_platform(platform);
            search.set_query(query);
            search.retry();
            let state = search.settled().await;

            if cli.json {
                return print_json(&state);
            }
            if let Some(error) = &state.error {
                bail!("search failed: {}", error);
            }
            if !state.quota_warning.is_empty() {
                eprintln!("warning: {}", state.quota_warning);
            }
            for r in &state.results {
                let subscribed = if r.is_subscribed { " *" } else { "" };
                println!(
                    "{:<8} {:<28} {}{}",
                    r.platform_id, r.external_id, r.display_name, subscribed
                );
            }
        }

        Commands::Popular => {
            let token = require_token(&tokens, &config.auth.token_env).await?;
            let popular = client
                .popular_channels(&token, config.search.popular_limit)
                .await?;
            if cli.json {
                return print_json(&popular);
            }
            for r in &popular.results {
                println!("{:<8} {:<28} {}", r.platform_id, r.external_id, r.display_name);
            }
        }

        Commands::Recent { clear } => {
            let recent = recent();
            if clear {
                recent.clear();
                return Ok(());
            }
            let entries = recent.list();
            if cli.json {
                return print_json(&entries);
            }
            for e in &entries {
                println!("{}", e.query);
            }
        }

        Commands::Subscriptions => {
            let token = require_token(&tokens, &config.auth.token_env).await?;
            let subscriptions = client.list_subscriptions(&token).await?;
            if cli.json {
                return print_json(&subscriptions);
            }
            for s in &subscriptions {
                let flags = match (s.enabled, s.is_favorite) {
                    (true, true) => "*",
                    (true, false) => " ",
                    (false, _) => "-",
                };
                println!(
                    "{} {:<8} {:<28} {}",
                    flags, s.platform, s.channel_id, s.display_name
                );
            }
        }

        Commands::Subscribe { platform, input } => {
            let token = require_token(&tokens, &config.auth.token_env).await?;
            let created = client.add_subscription(&token, platform, &input).await?;
            if cli.json {
                return print_json(&created);
            }
            println!("subscribed to {} ({})", created.display_name, created.channel_id);
        }

        Commands::Unsubscribe { channel_id } => {
            let token = require_token(&tokens, &config.auth.token_env).await?;
            client.remove_subscription(&token, &channel_id).await?;
            println!("unsubscribed from {}", channel_id);
        }

        Commands::Favorite { channel_id, off } => {
            let token = require_token(&tokens, &config.auth.token_env).await?;
            client.set_favorite(&token, &channel_id, !off).await?;
        }

        Commands::Me => {
            let token = require_token(&tokens, &config.auth.token_env).await?;
            let info = client.plan_info(&token).await?;
            if cli.json {
                return print_json(&info);
            }
            println!("plan:     {}", info.plan_type.as_deref().unwrap_or("unknown"));
            if let (Some(used), Some(max)) = (info.channel_count, info.max_channels) {
                println!("channels: {}/{}", used, max);
            }
        }
    }

    Ok(())
}

fn init_logging() -> anyhow::Result<()> {
    let log_path = platform::log_file();
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // RUST_LOG wins; otherwise keep HTTP client internals quiet.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();
    Ok(())
}

async fn require_token(tokens: &EnvToken, var: &str) -> anyhow::Result<String> {
    match tokens.id_token().await {
        Some(token) => Ok(token),
        None => bail!("not signed in: set {} to an ID token", var),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
