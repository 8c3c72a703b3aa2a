use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use lanefeed::app::{App, AppOptions, EventOutcome};
use lanefeed::config::Config;
use lanefeed::lanes::{LaneController, LanePhase};
use lanefeed::provider::{build_http_client, Item, RedditClient, SortMode, TopicId};
use lanefeed::settings::{AppSettings, SettingsPatch, Theme};
use lanefeed::store::FileStore;
use lanefeed::util::{
    format_count, format_score, single_line, strip_control_chars, time_ago, truncate_to_width,
};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Get the config directory path (~/.config/lanefeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("lanefeed"))
}

/// Restrict a directory to the current user (Unix only). Failures are logged.
fn restrict_permissions(dir: &std::path::Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(dir, perms) {
                    tracing::warn!(path = %dir.display(), error = %e, "Failed to set directory permissions to 0700");
                }
            }
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to read directory metadata");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}

fn parse_sort(s: &str) -> Result<SortMode, String> {
    SortMode::from_str_name(s).ok_or_else(|| format!("unknown sort '{s}' (hot, new, top, rising)"))
}

fn parse_theme(s: &str) -> Result<Theme, String> {
    Theme::from_str_name(s).ok_or_else(|| format!("unknown theme '{s}' (light, dark)"))
}

#[derive(Parser, Debug)]
#[command(name = "lanefeed", about = "Multi-lane subreddit reader")]
struct Args {
    /// Config file (default: ~/.config/lanefeed/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory for the lane list and settings
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List open lanes in display order
    Lanes,
    /// Open a lane for a topic
    Add { topic: String },
    /// Close a lane
    Remove { topic: String },
    /// Fetch and print an open lane
    Show {
        topic: String,
        #[arg(long, default_value = "hot", value_parser = parse_sort)]
        sort: SortMode,
        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Search topics by name
    Search { query: String },
    /// Show or change settings
    Settings {
        #[arg(long, value_parser = parse_theme)]
        theme: Option<Theme>,
        #[arg(long)]
        auto_refresh: Option<bool>,
        #[arg(long)]
        refresh_interval_ms: Option<u64>,
        #[arg(long)]
        show_awards: Option<bool>,
        #[arg(long)]
        show_thumbnails: Option<bool>,
        #[arg(long)]
        compact: Option<bool>,
    },
    /// Load every lane and keep them refreshed until interrupted
    Watch {
        /// Viewport width in columns
        #[arg(long, default_value_t = 120)]
        width: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let data_dir = args
        .data_dir
        .clone()
        .or_else(|| config.data_dir.clone())
        .unwrap_or(config_dir);
    let store = FileStore::open(&data_dir)
        .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?;
    restrict_permissions(store.dir());

    let http = build_http_client(&config.user_agent).context("Failed to build HTTP client")?;
    let provider = RedditClient::new(http, config.base_url()?).with_timeout(config.request_timeout());

    let mut app = App::new(Arc::new(provider), Arc::new(store), AppOptions::from(&config));

    match args.command {
        Command::Lanes => print_lanes(&app),
        Command::Add { topic } => {
            app.add_topic(topic.as_str())
                .await
                .with_context(|| format!("Failed to add r/{topic}"))?;
            println!("Added r/{topic}");
            print_lanes(&app);
        }
        Command::Remove { topic } => {
            if app.remove_topic(&TopicId::from(topic.as_str())) {
                println!("Removed r/{topic}");
            } else {
                println!("r/{topic} is not open");
            }
        }
        Command::Show { topic, sort, pages } => show(&mut app, topic.into(), sort, pages).await?,
        Command::Search { query } => search(&mut app, &query).await?,
        Command::Settings {
            theme,
            auto_refresh,
            refresh_interval_ms,
            show_awards,
            show_thumbnails,
            compact,
        } => {
            let patch = SettingsPatch {
                theme,
                show_awards,
                show_thumbnails,
                compact_mode: compact,
                auto_refresh,
                refresh_interval_ms,
            };
            if !patch.is_empty() {
                app.update_settings(&patch)
                    .context("Failed to save settings")?;
            }
            print_settings(app.settings());
        }
        Command::Watch { width } => watch(&mut app, width).await?,
    }

    Ok(())
}

fn print_lanes(app: &App) {
    if app.topics().is_empty() {
        println!("No lanes open. Add one with `lanefeed add <topic>`.");
        return;
    }
    for (i, topic) in app.topics().iter().enumerate() {
        println!("{:>2}. r/{}", i + 1, topic);
    }
}

fn print_settings(s: &AppSettings) {
    println!("theme             {}", s.theme.name());
    println!("auto_refresh      {}", s.auto_refresh);
    println!("refresh_interval  {} ms", s.refresh_interval_ms);
    println!("show_awards       {}", s.show_awards);
    println!("show_thumbnails   {}", s.show_thumbnails);
    println!("compact_mode      {}", s.compact_mode);
}

/// One listing row. Remote text is sanitized before it reaches the terminal.
fn print_item(item: &Item, settings: &AppSettings, width: usize) {
    let now = Utc::now();
    let title = strip_control_chars(&item.title);
    let title = single_line(&title);
    let meta = format!(
        "{:>6}  {:>5}c  {:>4}  ",
        format_score(item.score),
        format_count(item.num_comments),
        time_ago(item.created_at, now),
    );
    let room = width.saturating_sub(meta.len());
    println!("{meta}{}", truncate_to_width(&title, room));

    if settings.compact_mode {
        return;
    }
    let mut detail = format!(
        "u/{}  {}",
        strip_control_chars(&item.author),
        strip_control_chars(&item.domain)
    );
    if item.award_count > 0 {
        detail.push_str(&format!("  {} awards", item.award_count));
    }
    if item.thumbnail_url.is_some() {
        detail.push_str("  [thumb]");
    }
    if item.is_video {
        detail.push_str("  [video]");
    }
    println!("{:20}{}", "", truncate_to_width(&detail, width.saturating_sub(20)));
}

fn print_lane(lane: &LaneController, items: &[Item], settings: &AppSettings, width: usize) {
    println!(
        "r/{} [{}] {} items, {}",
        lane.topic(),
        lane.sort(),
        items.len(),
        lane.phase().name()
    );
    if let Some(err) = lane.last_error() {
        println!("  error: {}", strip_control_chars(err));
    }
    for item in items {
        print_item(item, settings, width);
    }
    if !lane.has_more() && lane.phase() == LanePhase::Ready {
        println!("  (end of feed)");
    }
}

async fn show(app: &mut App, topic: TopicId, sort: SortMode, pages: u32) -> Result<()> {
    if app.lane(&topic).is_none() {
        anyhow::bail!("r/{topic} is not open; add it first with `lanefeed add {topic}`");
    }

    if !app.change_sort(&topic, sort) {
        app.load(&topic);
    }
    app.settle().await;

    for _ in 1..pages {
        if !app.load_more(&topic) {
            break;
        }
        app.settle().await;
    }

    let lane = app
        .lane(&topic)
        .context("lane disappeared while loading")?;
    let items = app.display_items(&topic).unwrap_or_default();
    print_lane(lane, &items, app.settings(), 100);
    Ok(())
}

async fn search(app: &mut App, query: &str) -> Result<()> {
    app.on_query_change(query);
    if !app.search().is_pending() {
        println!("Query too short");
        return Ok(());
    }

    if !app.wait_for_search().await {
        anyhow::bail!("Search failed: the search task stopped unexpectedly");
    }

    if let Some(err) = app.search().last_error() {
        anyhow::bail!("Search failed: {err}");
    }
    if app.search_results().is_empty() {
        println!("No topics match '{query}'");
    }
    for result in app.search_results() {
        let description = strip_control_chars(&result.description);
        println!(
            "r/{:<24} {:>7} subscribers  {}",
            result.topic,
            format_count(result.subscriber_count),
            truncate_to_width(&single_line(&description), 60)
        );
    }
    Ok(())
}

async fn watch(app: &mut App, width: u16) -> Result<()> {
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())?;
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt())?;

    app.set_viewport_width(width);
    let window = app.visible_lanes();
    let visible: Vec<String> = window.visible.iter().map(|t| format!("r/{t}")).collect();
    println!("Watching {} lanes (visible: {})", app.topics().len(), visible.join(", "));
    app.start();

    loop {
        #[cfg(unix)]
        let sigterm_fut = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_fut = std::future::pending::<Option<()>>();

        #[cfg(unix)]
        let sigint_fut = sigint.recv();
        #[cfg(not(unix))]
        let sigint_fut = std::future::pending::<Option<()>>();

        tokio::select! {
            biased;

            _ = sigterm_fut => {
                tracing::info!("Received SIGTERM, shutting down gracefully");
                break;
            }

            _ = sigint_fut => {
                tracing::info!("Received SIGINT, shutting down gracefully");
                break;
            }

            outcome = app.process_next() => match outcome {
                EventOutcome::LaneUpdated(topic) => {
                    if let Some(lane) = app.lane(&topic) {
                        let stamp = Utc::now().format("%H:%M:%S");
                        match lane.last_error() {
                            Some(err) => println!("{stamp} r/{topic}: {}", strip_control_chars(err)),
                            None => println!(
                                "{stamp} r/{topic} [{}]: {} items{}",
                                lane.sort(),
                                lane.items().len(),
                                if lane.has_more() { "" } else { " (end)" }
                            ),
                        }
                    }
                }
                EventOutcome::RefreshStarted(topic) => {
                    tracing::debug!(topic = %topic, "Auto-refreshing");
                }
                _ => {}
            },
        }
    }

    println!("Goodbye!");
    Ok(())
}
