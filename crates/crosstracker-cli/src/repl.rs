//! Interactive TQL shell.
//!
//! Launch with `crosstracker repl`. Lines starting with `/` are commands,
//! anything else runs as a TQL query. Tab completes commands, keywords and
//! `@metadata`.

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};
use uuid::Uuid;

use crosstracker::model::User;
use crosstracker::validation::Metadata;
use crosstracker::Page;

use crate::output::{describe_error, render_queries, render_report, OutputFormat};
use crate::session::{ScopeArgs, TrackerSession};

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/project", "Set the project 'self' refers to"),
    ("/trackers", "Set tracker ids for queries without FROM"),
    ("/user", "Run queries as a user (no name: anonymous)"),
    ("/page", "Set page size and offset"),
    ("/format", "Output as table or json"),
    ("/explain", "Show the SQL of a query"),
    ("/validate", "Check a query without running it"),
    ("/saved", "List saved queries of a widget"),
    ("/run", "Run a saved query"),
    ("/status", "Show the current settings"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "ORDER", "BY", "ASC", "DESC", "AND", "OR", "NOT", "IN", "BETWEEN",
    "NOW()", "OPEN()", "MYSELF()", "WITH", "WITHOUT", "PARENT", "CHILDREN", "IS", "LINKED", "TO",
    "TYPE", "ARTIFACT", "TRACKER",
];

/// Completes commands, TQL keywords and `@metadata`.
struct TqlHelper {
    metadata: Vec<String>,
}

impl Default for TqlHelper {
    fn default() -> Self {
        let mut metadata: Vec<String> = Metadata::ALL.iter().map(|m| format!("@{}", m.name())).collect();
        metadata.extend(["@project".to_string(), "@tracker.name".to_string()]);
        metadata.sort();
        metadata.dedup();
        Self { metadata }
    }
}

impl Completer for TqlHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if input.starts_with('/') && !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        let start = input
            .rfind(|c: char| c.is_whitespace() || c == '(' || c == ',')
            .map_or(0, |i| i + 1);
        let word = &input[start..];
        if word.is_empty() {
            return Ok((pos, Vec::new()));
        }

        let matches: Vec<Pair> = if word.starts_with('@') {
            self.metadata
                .iter()
                .filter(|m| m.starts_with(word))
                .map(|m| Pair {
                    display: m.clone(),
                    replacement: m.clone(),
                })
                .collect()
        } else {
            let upper = word.to_uppercase();
            KEYWORDS
                .iter()
                .filter(|k| k.starts_with(&upper))
                .map(|k| Pair {
                    display: k.to_string(),
                    replacement: format!("{k} "),
                })
                .collect()
        };
        Ok((start, matches))
    }
}

impl Hinter for TqlHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for TqlHelper {}
impl Validator for TqlHelper {}
impl Helper for TqlHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Session state.
pub struct ReplState {
    pub scope: ScopeArgs,
    pub user_name: Option<String>,
    pub page: Page,
    pub format: OutputFormat,
}

/// Run the interactive REPL.
pub fn run(session: &TrackerSession, mut state: ReplState) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mcrosstracker v{}\x1b[0m \x1b[90m{}\x1b[0m",
        env!("CARGO_PKG_VERSION"),
        session.path()
    );
    eprintln!();
    eprintln!(
        "    Type a TQL query to run it, \x1b[36m/\x1b[0m for commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(40)
        .build();

    let mut rl: Editor<TqlHelper, rustyline::history::DefaultHistory> = Editor::with_config(config)?;
    rl.set_helper(Some(TqlHelper::default()));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let hist_path = std::path::PathBuf::from(crate::config::home_dir()).join(".crosstracker_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let prompt = " \x1b[36mtql>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let Some(input) = line.strip_prefix('/') else {
                    cmd_query(session, &state, line);
                    continue;
                };
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let mut parts = input.splitn(2, ' ');
                let cmd = parts.next().unwrap_or("");
                let args = parts.next().unwrap_or("").trim();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "project" => cmd_project(session, args, &mut state),
                    "trackers" => cmd_trackers(args, &mut state),
                    "user" => cmd_user(session, args, &mut state),
                    "page" => cmd_page(args, &mut state),
                    "format" => cmd_format(args, &mut state),
                    "explain" => cmd_explain(session, &state, args),
                    "validate" => cmd_validate(session, &state, args),
                    "saved" => cmd_saved(session, args),
                    "run" => cmd_run(session, &state, args),
                    "status" => cmd_status(&state),
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(&hist_path);

    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Example: SELECT @pretty_title, @status FROM @project = 'self' WHERE @status = OPEN()");
    eprintln!();
}

/// Resolve the user and scope of the state, reporting failures.
fn context(session: &TrackerSession, state: &ReplState) -> Option<(User, crosstracker::QueryScope)> {
    let user = match session.user(state.user_name.as_deref()) {
        Ok(user) => user,
        Err(e) => {
            eprintln!("  {}", describe_error(&e));
            return None;
        }
    };
    match session.scope(&state.scope) {
        Ok(scope) => Some((user, scope)),
        Err(e) => {
            eprintln!("  {e}");
            None
        }
    }
}

fn cmd_query(session: &TrackerSession, state: &ReplState, tql: &str) {
    let Some((user, scope)) = context(session, state) else {
        return;
    };
    match session.query(tql, &scope, &user, state.page) {
        Ok(report) => match render_report(&report, state.format) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("  {e}"),
        },
        Err(e) => eprintln!("  {}", describe_error(&e)),
    }
}

fn cmd_explain(session: &TrackerSession, state: &ReplState, tql: &str) {
    if tql.is_empty() {
        eprintln!("  Usage: /explain <query>");
        return;
    }
    let Some((user, scope)) = context(session, state) else {
        return;
    };
    match session.explain(tql, &scope, &user, state.page) {
        Ok(explanation) => match serde_json::to_string_pretty(&explanation) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("  {e}"),
        },
        Err(e) => eprintln!("  {}", describe_error(&e)),
    }
}

fn cmd_validate(session: &TrackerSession, state: &ReplState, tql: &str) {
    if tql.is_empty() {
        eprintln!("  Usage: /validate <query>");
        return;
    }
    let Some((user, scope)) = context(session, state) else {
        return;
    };
    match session.validate(tql, &scope, &user) {
        Ok(trackers) => eprintln!("  Valid query over {} tracker(s): {trackers:?}", trackers.len()),
        Err(e) => eprintln!("  {}", describe_error(&e)),
    }
}

fn cmd_project(session: &TrackerSession, args: &str, state: &mut ReplState) {
    let project = (!args.is_empty()).then(|| args.to_string());
    let candidate = ScopeArgs {
        project: project.clone(),
        trackers: state.scope.trackers.clone(),
    };
    match session.scope(&candidate) {
        Ok(_) => {
            state.scope.project = project;
            eprintln!("  Project: {}", args_or(args, "none"));
        }
        Err(e) => eprintln!("  {e}"),
    }
}

fn cmd_trackers(args: &str, state: &mut ReplState) {
    let parsed: Result<Vec<i64>, _> = args
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect();
    match parsed {
        Ok(ids) => {
            eprintln!("  Trackers: {ids:?}");
            state.scope.trackers = ids;
        }
        Err(e) => eprintln!("  Usage: /trackers <id>[,<id>...] ({e})"),
    }
}

fn cmd_user(session: &TrackerSession, args: &str, state: &mut ReplState) {
    let user_name = (!args.is_empty()).then(|| args.to_string());
    match session.user(user_name.as_deref()) {
        Ok(user) => {
            let name = if user.is_anonymous() { "anonymous" } else { user.user_name.as_str() };
            eprintln!("  Running queries as {name}");
            state.user_name = user_name;
        }
        Err(e) => eprintln!("  {}", describe_error(&e)),
    }
}

fn cmd_page(args: &str, state: &mut ReplState) {
    let mut parts = args.split_whitespace().map(str::parse::<usize>);
    match (parts.next(), parts.next()) {
        (Some(Ok(limit)), None) => state.page = Page::new(limit, 0),
        (Some(Ok(limit)), Some(Ok(offset))) => state.page = Page::new(limit, offset),
        _ => {
            eprintln!("  Usage: /page <limit> [offset]");
            return;
        }
    }
    eprintln!("  Page: limit {:?}, offset {}", state.page.limit, state.page.offset);
}

fn cmd_format(args: &str, state: &mut ReplState) {
    match args.parse::<OutputFormat>() {
        Ok(format) => {
            state.format = format;
            eprintln!("  Format: {format:?}");
        }
        Err(_) => eprintln!("  Usage: /format table|json"),
    }
}

fn cmd_saved(session: &TrackerSession, args: &str) {
    let Ok(widget_id) = args.parse::<i64>() else {
        eprintln!("  Usage: /saved <widget id>");
        return;
    };
    match session.list(widget_id) {
        Ok(queries) => print!("{}", render_queries(&queries)),
        Err(e) => eprintln!("  {}", describe_error(&e)),
    }
}

fn cmd_run(session: &TrackerSession, state: &ReplState, args: &str) {
    let Ok(uuid) = Uuid::parse_str(args) else {
        eprintln!("  Usage: /run <query uuid>");
        return;
    };
    let user = match session.user(state.user_name.as_deref()) {
        Ok(user) => user,
        Err(e) => {
            eprintln!("  {}", describe_error(&e));
            return;
        }
    };
    match session.run(&uuid, &user, state.page) {
        Ok(report) => match render_report(&report, state.format) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("  {e}"),
        },
        Err(e) => eprintln!("  {}", describe_error(&e)),
    }
}

fn cmd_status(state: &ReplState) {
    eprintln!();
    eprintln!("  Project:  {}", state.scope.project.as_deref().unwrap_or("none"));
    eprintln!("  Trackers: {:?}", state.scope.trackers);
    eprintln!("  User:     {}", state.user_name.as_deref().unwrap_or("anonymous"));
    eprintln!("  Page:     limit {:?}, offset {}", state.page.limit, state.page.offset);
    eprintln!("  Format:   {:?}", state.format);
    eprintln!();
}

fn args_or<'a>(args: &'a str, default: &'a str) -> &'a str {
    if args.is_empty() {
        default
    } else {
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustyline::history::DefaultHistory;

    fn complete(line: &str) -> (usize, Vec<String>) {
        let helper = TqlHelper::default();
        let history = DefaultHistory::new();
        let ctx = rustyline::Context::new(&history);
        let (start, pairs) = helper.complete(line, line.len(), &ctx).unwrap();
        (start, pairs.into_iter().map(|p| p.replacement).collect())
    }

    #[test]
    fn test_complete_commands() {
        let (start, matches) = complete("/ex");
        assert_eq!(start, 0);
        assert_eq!(matches, vec!["/explain ", "/exit "]);
    }

    #[test]
    fn test_complete_metadata() {
        let (start, matches) = complete("SELECT @sub");
        assert_eq!(start, 7);
        assert_eq!(matches, vec!["@submitted_by", "@submitted_on"]);
    }

    #[test]
    fn test_complete_keywords_case_insensitively() {
        let (start, matches) = complete("SELECT @id FROM @project = 'self' wh");
        assert_eq!(start, 34);
        assert_eq!(matches, vec!["WHERE "]);
    }
}
