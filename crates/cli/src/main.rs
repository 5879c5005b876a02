use clap::{Parser, Subcommand};
use lib::feed::{FeedAdapter, StubFeed};
use lib::error::ReviewError;
use lib::review::{Cell, ReviewSession, RowAction, RowHandle, RowView, SessionState, TableView};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "gatekeep")]
#[command(about = "Gatekeep CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: GATEKEEP_CONFIG_PATH or ~/.gatekeep/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Review intercepted messages from the feed. Rows are printed as they arrive; type `a <row>` to accept, `r <row>` to reject, `q` to quit.
    Watch {
        /// Config file path (default: GATEKEEP_CONFIG_PATH or ~/.gatekeep/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Feed WebSocket URL (default from GATEKEEP_FEED_URL or config)
        #[arg(long, value_name = "URL")]
        url: Option<String>,
    },

    /// Run a stub feed. Each stdin line `<src> <dst> <payload...>` is published as an intercepted message.
    StubFeed {
        /// Config file path (default: GATEKEEP_CONFIG_PATH or ~/.gatekeep/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Port (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("gatekeep {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Watch { config, url }) => {
            if let Err(e) = run_watch(config, url).await {
                log::error!("watch failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::StubFeed { config, port }) => {
            if let Err(e) = run_stub_feed(config, port).await {
                log::error!("stub feed failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

/// Terminal row view: keeps the rows in a `TableView` and prints every change on redraw.
struct ConsoleView {
    table: TableView,
    changed: Vec<RowHandle>,
}

impl ConsoleView {
    fn new() -> Self {
        Self {
            table: TableView::new(),
            changed: Vec::new(),
        }
    }

    fn render_row(handle: RowHandle, cells: &[Cell]) -> String {
        let text: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
        format!("[{:>3}] {}", handle, text.join(" | "))
    }
}

impl RowView for ConsoleView {
    fn row_count(&self) -> usize {
        self.table.row_count()
    }

    fn add_row(&mut self, cells: Vec<Cell>) -> RowHandle {
        let handle = self.table.add_row(cells);
        self.changed.push(handle);
        handle
    }

    fn update_row(
        &mut self,
        handle: RowHandle,
        column: usize,
        value: Cell,
    ) -> Result<(), ReviewError> {
        self.table.update_row(handle, column, value)?;
        self.changed.push(handle);
        Ok(())
    }

    fn redraw(&mut self) {
        self.table.redraw();
        let mut stdout = std::io::stdout();
        for handle in self.changed.drain(..) {
            if let Some(cells) = self.table.row(handle) {
                let _ = writeln!(stdout, "{}", Self::render_row(handle, cells));
            }
        }
        let _ = stdout.flush();
    }
}

/// Parse `a <row>` / `r <row>`.
fn parse_action(line: &str) -> Option<RowAction> {
    let mut parts = line.split_whitespace();
    let approved = match parts.next()? {
        "a" | "accept" => true,
        "r" | "reject" => false,
        _ => return None,
    };
    let row: u64 = parts.next()?.parse().ok()?;
    Some(RowAction {
        handle: RowHandle::new(row),
        approved,
    })
}

async fn run_watch(
    config_path: Option<std::path::PathBuf>,
    url: Option<String>,
) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let url = url.unwrap_or_else(|| lib::config::resolve_feed_url(&config));
    log::info!("connecting to feed at {}", url);

    let mut feed = FeedAdapter::new(url).spawn();
    let mut session = ReviewSession::new(ConsoleView::new(), feed.sender.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_status = String::new();

    loop {
        tokio::select! {
            ev = feed.events.recv() => {
                let Some(ev) = ev else { break };
                session.handle_event(ev);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if input.eq_ignore_ascii_case("q") || input.eq_ignore_ascii_case("/quit") {
                    break;
                }
                match parse_action(input) {
                    Some(action) => {
                        if let Err(e) = session.handle_action(action) {
                            eprintln!("! {}", e);
                        }
                    }
                    None => eprintln!("! expected `a <row>`, `r <row>` or `q`"),
                }
            }
        }
        if session.status() != last_status {
            last_status = session.status().to_string();
            println!("-- {}", last_status);
        }
        if session.state() == SessionState::Closed {
            break;
        }
    }

    feed.task.abort();
    Ok(())
}

async fn run_stub_feed(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, _) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.stub.port = p;
    }
    let bind_addr = format!("{}:{}", config.stub.bind.trim(), config.stub.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("stub feed on ws://{}/ws; type `<src> <dst> <payload>` to intercept a message", bind_addr);

    let feed = StubFeed::new();
    let server = tokio::spawn(feed.clone().serve(listener));
    let mut verdicts = feed.verdicts();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let mut parts = line.trim().splitn(3, char::is_whitespace);
                match (parts.next(), parts.next()) {
                    (Some(src), Some(dst)) if !src.is_empty() => {
                        let payload = parts.next().unwrap_or("");
                        let id = feed.publish(src, dst, payload).await;
                        println!("intercepted #{}", id);
                    }
                    _ => eprintln!("! expected `<src> <dst> <payload>`"),
                }
            }
            verdict = verdicts.recv() => {
                if let Ok(v) = verdict {
                    println!("#{} {}", v.message_id, if v.approved { "accepted" } else { "rejected" });
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    server.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_accept_and_reject() {
        assert_eq!(
            parse_action("a 3"),
            Some(RowAction {
                handle: RowHandle::new(3),
                approved: true
            })
        );
        assert_eq!(
            parse_action("reject 0"),
            Some(RowAction {
                handle: RowHandle::new(0),
                approved: false
            })
        );
        assert_eq!(parse_action("a"), None);
        assert_eq!(parse_action("x 1"), None);
        assert_eq!(parse_action("a one"), None);
    }

    #[test]
    fn console_view_tracks_changes_until_redraw() {
        let mut view = ConsoleView::new();
        let h = view.add_row(vec![Cell::Number(1), Cell::Controls]);
        view.update_row(h, 1, Cell::Verdict(true)).expect("update");
        assert_eq!(view.changed, vec![h, h]);
        view.redraw();
        assert!(view.changed.is_empty());
        assert_eq!(
            ConsoleView::render_row(h, &[Cell::Number(1), Cell::Verdict(true)]),
            "[  0] 1 | Message accepted"
        );
    }
}
