mod commands;
mod render;

use std::time::Duration;

use anyhow::Result;
use caldir_agenda_core::{AgendaConfig, CaldirProvider, DateRange, FilterMode};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "caldir-agenda")]
#[command(about = "Show an agenda of upcoming events from your caldir directory")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the agenda once
    List {
        #[command(flatten)]
        agenda: AgendaArgs,
    },
    /// Keep the agenda up to date as calendar files change
    Watch {
        #[command(flatten)]
        agenda: AgendaArgs,

        /// How often to check the calendar directory (e.g. "5s", "1m")
        #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
        interval: Duration,
    },
}

#[derive(Args)]
struct AgendaArgs {
    /// Only show this calendar (by slug)
    #[arg(short, long)]
    calendar: Option<String>,

    /// First day to show (YYYY-MM-DD, "today" or "tomorrow")
    #[arg(long)]
    from: Option<String>,

    /// Last day to show (YYYY-MM-DD)
    #[arg(long)]
    to: Option<String>,

    /// Number of days to show when --to is not given
    #[arg(short, long)]
    days: Option<i64>,

    /// Only show all-day events
    #[arg(long)]
    all_day_only: bool,

    /// Only show the first event of each calendar
    #[arg(long)]
    one_per_calendar: bool,
}

/// Everything a command needs to build its agenda view.
pub struct AgendaRequest {
    pub provider: CaldirProvider,
    pub window: DateRange,
    pub filter: FilterMode,
    /// Days in the window; set when the window should roll over with today
    pub follow_today: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { agenda } => commands::list::run(resolve_request(agenda)?).await,
        Commands::Watch { agenda, interval } => {
            commands::watch::run(resolve_request(agenda)?, interval).await
        }
    }
}

fn resolve_request(args: AgendaArgs) -> Result<AgendaRequest> {
    let config = AgendaConfig::load()?;
    let days = args.days.unwrap_or(config.agenda.days);
    if days < 1 {
        anyhow::bail!("--days must be at least 1");
    }

    let window = DateRange::from_args(args.from.as_deref(), args.to.as_deref(), days)?;

    let mut filter = config.agenda.filters;
    if args.all_day_only {
        filter |= FilterMode::ALL_DAY_ONLY;
    }
    if args.one_per_calendar {
        filter |= FilterMode::ONE_PER_CALENDAR;
    }

    let provider = resolve_provider(&config, args.calendar)?;
    let follow_today = (args.from.is_none() && args.to.is_none()).then_some(days);

    Ok(AgendaRequest {
        provider,
        window,
        filter,
        follow_today,
    })
}

fn resolve_provider(config: &AgendaConfig, calendar: Option<String>) -> Result<CaldirProvider> {
    let provider = CaldirProvider::from_config(config);
    let calendars = provider.calendars()?;

    if calendars.is_empty() {
        anyhow::bail!(
            "No calendars found in {}.\n\n\
            Each calendar is a subdirectory of .ics files. Set calendar_dir in:\n  \
            {}",
            provider.data_path().display(),
            AgendaConfig::config_path()?.display()
        );
    }

    match calendar {
        Some(slug) => {
            if !calendars.iter().any(|c| c.slug == slug) {
                let available: Vec<_> = calendars.iter().map(|c| c.slug.as_str()).collect();
                anyhow::bail!(
                    "Calendar '{}' not found. Available: {}",
                    slug,
                    available.join(", ")
                );
            }
            Ok(provider.only_calendars(vec![slug]))
        }
        None => Ok(provider),
    }
}
