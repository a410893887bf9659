use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use patent_fetcher::config::{ConfigLoader, Settings};
use patent_fetcher::domain::DateRange;
use patent_fetcher::error::FetcherError;
use patent_fetcher::fetch::{FetchOptions, FetchRequest, Fetcher};
use patent_fetcher::gateway::PatentHttpGateway;
use patent_fetcher::output::JsonOutput;
use patent_fetcher::sink::OutputKind;

#[derive(Parser)]
#[command(name = "patent-fetcher")]
#[command(about = "Fetch patents granted within a date range and write them to a local archive or SQLite")]
#[command(version, author)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Settings file (defaults to ./patent-fetcher.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Shorthand for `fetch START_DATE END_DATE` with default options
    #[arg(requires = "end_date")]
    start_date: Option<NaiveDate>,

    #[arg(requires = "start_date")]
    end_date: Option<NaiveDate>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    fn into_command(self) -> Option<Commands> {
        match (self.command, self.start_date, self.end_date) {
            (Some(command), _, _) => Some(command),
            (None, Some(start_date), Some(end_date)) => {
                Some(Commands::Fetch(FetchArgs::between(start_date, end_date)))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Fetch patents granted between START_DATE and END_DATE")]
    Fetch(FetchArgs),
    #[command(about = "Check that the patent API is reachable and healthy")]
    CheckHealth,
}

#[derive(Debug, Args)]
struct FetchArgs {
    /// First grant date (YYYY-MM-DD)
    start_date: NaiveDate,

    /// Last grant date (YYYY-MM-DD), must be after START_DATE
    end_date: NaiveDate,

    /// Page to start from (default 1)
    #[arg(long)]
    start_page: Option<u32>,

    /// Number of pages to fetch (default: all pages)
    #[arg(long)]
    num_pages: Option<u32>,

    /// Patents per page (default: the configured max_page_size)
    #[arg(long)]
    page_size: Option<u32>,

    /// Where to write fetched patents
    #[arg(long, value_enum, default_value_t = OutputKind::None)]
    output: OutputKind,
}

impl FetchArgs {
    fn between(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            start_page: None,
            num_pages: None,
            page_size: None,
            output: OutputKind::None,
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<FetcherError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &FetcherError) -> u8 {
    match error {
        FetcherError::InvalidDateRange { .. }
        | FetcherError::InvalidPageWindow(_)
        | FetcherError::InvalidPageCount(_)
        | FetcherError::ConfigRead(_)
        | FetcherError::ConfigParse(_)
        | FetcherError::InvalidConfig(_) => 2,
        FetcherError::Transport(_)
        | FetcherError::HealthCheckFailed { .. }
        | FetcherError::FetchFailed { .. } => 3,
        FetcherError::Sink(_) => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.clone();
    let Some(command) = cli.into_command() else {
        miette::bail!("expected a command or START_DATE END_DATE; see --help");
    };
    let settings = ConfigLoader::resolve(config.as_deref())?;

    match command {
        Commands::Fetch(args) => run_fetch(args, &settings),
        Commands::CheckHealth => run_check_health(&settings),
    }
}

fn run_fetch(args: FetchArgs, settings: &Settings) -> miette::Result<()> {
    let range = DateRange::new(args.start_date, args.end_date)?;
    let options = FetchOptions {
        start_page: args.start_page,
        num_pages: args.num_pages,
        page_size: args.page_size,
        output: args.output,
    };
    let request = FetchRequest::new(range, options, settings.max_page_size)?;

    let gateway = PatentHttpGateway::new(settings)?;
    let fetcher = Fetcher::new(gateway, settings.buffer_size);
    let sink = request.output().build(settings);

    let outcome = fetcher.fetch(&request, sink.as_ref())?;
    JsonOutput::print_fetch(&outcome).into_diagnostic()?;
    Ok(())
}

fn run_check_health(settings: &Settings) -> miette::Result<()> {
    let gateway = PatentHttpGateway::new(settings)?;
    let fetcher = Fetcher::new(gateway, settings.buffer_size);
    let health = fetcher.check_health()?;
    JsonOutput::print_health(&health).into_diagnostic()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Option<Commands> {
        Cli::try_parse_from(args.iter().copied())
            .unwrap()
            .into_command()
    }

    fn date(value: &str) -> NaiveDate {
        value.parse().unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_dates_fetch_with_defaults() {
        let Some(Commands::Fetch(args)) = parse(&["patent-fetcher", "2001-04-25", "2001-05-25"])
        else {
            panic!("expected a fetch command");
        };
        assert_eq!(args.start_date, date("2001-04-25"));
        assert_eq!(args.end_date, date("2001-05-25"));
        assert_eq!(args.start_page, None);
        assert_eq!(args.num_pages, None);
        assert_eq!(args.page_size, None);
        assert_eq!(args.output, OutputKind::None);
    }

    #[test]
    fn fetch_subcommand_takes_options() {
        let command = parse(&[
            "patent-fetcher",
            "fetch",
            "2001-04-25",
            "2001-05-25",
            "--num-pages",
            "3",
            "--output",
            "sqlite",
        ]);
        assert_matches!(
            command,
            Some(Commands::Fetch(FetchArgs {
                num_pages: Some(3),
                output: OutputKind::Sqlite,
                ..
            }))
        );
    }

    #[test]
    fn check_health_is_not_taken_as_a_date() {
        assert_matches!(
            parse(&["patent-fetcher", "--config", "custom.json", "check-health"]),
            Some(Commands::CheckHealth)
        );
    }

    #[test]
    fn single_date_is_rejected() {
        assert!(Cli::try_parse_from(["patent-fetcher", "2001-04-25"]).is_err());
    }
}
