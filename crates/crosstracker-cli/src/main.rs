//! crosstracker: run TQL queries across trackers from the command line.

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use uuid::Uuid;

use crosstracker::{Page, TqlError, TqlResult, TrackerId, WidgetId};
use crosstracker_cli::output::{render_queries, render_report, OutputFormat};
use crosstracker_cli::repl::ReplState;
use crosstracker_cli::{describe_error, load_engine_config, resolve_db_path, ScopeArgs, TrackerSession};

#[derive(Parser)]
#[command(
    name = "crosstracker",
    about = "Cross-tracker search: query artifacts of several trackers with TQL",
    version
)]
struct Cli {
    /// Path to the tracker database.
    #[arg(short, long, global = true)]
    db: Option<String>,

    /// Path to a JSON engine configuration.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// User running the queries (anonymous when omitted).
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ScopeOpts {
    /// Project short name that `@project = 'self'` refers to.
    #[arg(short, long)]
    project: Option<String>,

    /// Tracker ids used when the query has no FROM clause.
    #[arg(short, long = "tracker", value_delimiter = ',')]
    trackers: Vec<TrackerId>,
}

impl From<ScopeOpts> for ScopeArgs {
    fn from(opts: ScopeOpts) -> Self {
        ScopeArgs {
            project: opts.project,
            trackers: opts.trackers,
        }
    }
}

#[derive(Args, Clone, Copy)]
struct PageOpts {
    /// Maximum number of artifacts (clamped by the configuration).
    #[arg(short, long)]
    limit: Option<usize>,

    #[arg(long, default_value_t = 0)]
    offset: usize,
}

impl From<PageOpts> for Page {
    fn from(opts: PageOpts) -> Self {
        Page {
            limit: opts.limit,
            offset: opts.offset,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema.
    Init {
        /// Also load a demo project with two trackers.
        #[arg(long)]
        demo: bool,
    },

    /// Run a TQL query.
    ///
    /// Example:
    ///   crosstracker query -p demo -u alice "SELECT @pretty_title, @status FROM @project = 'self' WHERE @status = OPEN()"
    Query {
        tql: String,
        #[command(flatten)]
        scope: ScopeOpts,
        #[command(flatten)]
        page: PageOpts,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Print the SQL a query compiles to, as JSON.
    Explain {
        tql: String,
        #[command(flatten)]
        scope: ScopeOpts,
        #[command(flatten)]
        page: PageOpts,
    },

    /// Check a query without running it.
    Validate {
        tql: String,
        #[command(flatten)]
        scope: ScopeOpts,
    },

    /// Save a query in a widget.
    Save {
        #[arg(short, long)]
        widget: WidgetId,
        #[arg(short, long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        tql: String,
    },

    /// List the saved queries of a widget.
    List {
        #[arg(short, long)]
        widget: WidgetId,
    },

    /// Run a saved query in the scope of its widget.
    Run {
        uuid: Uuid,
        #[command(flatten)]
        page: PageOpts,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Delete a saved query.
    Delete { uuid: Uuid },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   crosstracker completions bash > ~/.local/share/bash-completion/completions/crosstracker
    ///   crosstracker completions zsh > ~/.zfunc/_crosstracker
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch interactive REPL mode.
    Repl {
        #[command(flatten)]
        scope: ScopeOpts,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "crosstracker", &mut std::io::stdout());
        return Ok(());
    }

    let db_path = resolve_db_path(cli.db.as_deref());
    let config = load_engine_config(cli.config.as_deref())?;
    let session = TrackerSession::open(&db_path, config)?;

    match cli.command {
        Commands::Init { demo } => {
            if demo {
                crosstracker_cli::demo::seed(session.connection())?;
            }
            println!("Initialized tracker database: {db_path}");
        }

        Commands::Query {
            tql,
            scope,
            page,
            format,
        } => {
            let scope = session.scope(&scope.into())?;
            let user = or_exit(session.user(cli.user.as_deref()))?;
            let report = or_exit(session.query(&tql, &scope, &user, page.into()))?;
            println!("{}", render_report(&report, format)?);
        }

        Commands::Explain { tql, scope, page } => {
            let scope = session.scope(&scope.into())?;
            let user = or_exit(session.user(cli.user.as_deref()))?;
            let explanation = or_exit(session.explain(&tql, &scope, &user, page.into()))?;
            println!("{}", serde_json::to_string_pretty(&explanation)?);
        }

        Commands::Validate { tql, scope } => {
            let scope = session.scope(&scope.into())?;
            let user = or_exit(session.user(cli.user.as_deref()))?;
            let trackers = or_exit(session.validate(&tql, &scope, &user))?;
            println!("Valid query over {} tracker(s): {trackers:?}", trackers.len());
        }

        Commands::Save {
            widget,
            title,
            description,
            tql,
        } => {
            let user = or_exit(session.user(cli.user.as_deref()))?;
            let query = session.save(widget, &tql, &title, &description, &user)?;
            println!("{}", query.uuid);
        }

        Commands::List { widget } => {
            print!("{}", render_queries(&session.list(widget)?));
        }

        Commands::Run { uuid, page, format } => {
            let user = or_exit(session.user(cli.user.as_deref()))?;
            let report = or_exit(session.run(&uuid, &user, page.into()))?;
            println!("{}", render_report(&report, format)?);
        }

        Commands::Delete { uuid } => {
            if session.delete(&uuid)? {
                println!("Deleted query {uuid}");
            } else {
                eprintln!("No query {uuid}");
                std::process::exit(1);
            }
        }

        Commands::Repl { scope } => {
            let state = ReplState {
                scope: scope.into(),
                user_name: cli.user,
                page: Page::default(),
                format: OutputFormat::Table,
            };
            crosstracker_cli::repl::run(&session, state)?;
        }

        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Print query and lookup errors for the user and exit; propagate the rest.
fn or_exit<T>(result: TqlResult<T>) -> anyhow::Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(error @ (TqlError::Syntax(_) | TqlError::Invalid(_) | TqlError::NotFound(_))) => {
            eprintln!("{}", describe_error(&error));
            std::process::exit(1);
        }
        Err(error) => Err(error.into()),
    }
}
