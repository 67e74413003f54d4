use std::ffi::OsString;
use std::process::ExitCode;

use clap::builder::styling::AnsiColor;

use crate::interlude::*;

use crate::config::Config;
use crate::ops::UninstallNotice;
use crate::parser::{self, Source};
use crate::store::Store;
use crate::{engine, ops, publish, server};

mod print;

use print::PrintCommands;

pub async fn cli() -> Res<ExitCode> {
    use clap::Parser;

    let cli = Cli::parse();

    match cli.commands {
        Commands::Version => println!("{}", version_line()),
        Commands::Completions { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(shell, &mut Cli::command(), "sake", &mut std::io::stdout());
        }
        Commands::Print { commands } => commands.action(&configure(cli.store).await?)?,
        Commands::List {
            all,
            source,
            pattern,
        } => {
            let config = configure(cli.store).await?;
            let store = open_store(&config).await?;
            let args = source.into_iter().chain(pattern).collect::<Vec<_>>();
            for line in ops::list(&store, &args, all, config.parse_timeout()).await? {
                println!("{line}");
            }
        }
        Commands::Install {
            force,
            source,
            tasks,
        } => {
            let config = configure(cli.store).await?;
            let parsed = parser::parse(&Source::from_arg(&source), config.parse_timeout()).await?;
            let mut store = open_store(&config).await?;
            for notice in ops::install(&mut store, parsed, &tasks, force).await? {
                println!("{notice}");
            }
        }
        Commands::Uninstall { tasks } => {
            let mut store = open_store(&configure(cli.store).await?).await?;
            for notice in ops::uninstall(&mut store, &tasks).await? {
                match notice {
                    UninstallNotice::Removed { .. } => print!("{notice}"),
                    UninstallNotice::NotInstalled(_) => println!("{notice}"),
                }
            }
        }
        Commands::Examine { first, second } => {
            let (file, task) = match second {
                Some(task) => (first, Some(task)),
                None => (None, first),
            };
            let config = configure(cli.store).await?;
            let store = open_store(&config).await?;
            let text = ops::examine(
                &store,
                file.as_deref(),
                task.as_deref(),
                config.parse_timeout(),
            )
            .await?;
            print!("{text}");
        }
        Commands::Publish { tasks } => {
            let config = configure(cli.store).await?;
            let store = open_store(&config).await?;
            let text = publish::collect(&store, &tasks).await?;
            let url = publish::publish(&config.paste_url, text).await?;
            println!("{url}");
        }
        Commands::Serve { port, host, daemon } => {
            if daemon {
                return daemonize(daemon_args(cli.store.as_deref(), host.as_deref(), port));
            }
            let config = configure(cli.store).await?;
            let host = host.unwrap_or_else(|| config.host.clone());
            let port = port.unwrap_or(config.port);
            let addr = tokio::net::lookup_host((&host[..], port))
                .await
                .wrap_err_with(|| format!("error resolving {host}"))?
                .next()
                .ok_or_else(|| ferr!("no address found for {host}"))?;
            let store = Arc::new(open_store(&config).await?);
            server::serve(store, addr).await?;
        }
        Commands::Run { task, args } => {
            let config = configure(cli.store).await?;
            let store = open_store(&config).await?;
            let status = engine::run(&store, &config.engine, &task, &args).await?;
            if !status.success() {
                let code = status.code().unwrap_or(1);
                return Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Sources the config, letting `--store` win over every other layer.
async fn configure(store: Option<PathBuf>) -> Res<Config> {
    let mut config = Config::source().await?;
    if let Some(path) = store {
        config.store_path = Some(path);
    }
    Ok(config)
}

async fn open_store(config: &Config) -> Res<Store> {
    Store::open(config.store_path()?.to_owned(), config.parse_timeout()).await
}

fn version_line() -> String {
    let mut line = format!(
        "sake, version {} ({}",
        crate::build::PKG_VERSION,
        crate::build::BUILD_TARGET
    );
    if !crate::build::SHORT_COMMIT.is_empty() {
        line.push(' ');
        line.push_str(crate::build::SHORT_COMMIT);
    }
    line.push(')');
    line
}

/// The command line for the detached server: the parsed serve options
/// spelled out again, never the daemon flag.
fn daemon_args(store: Option<&Path>, host: Option<&str>, port: Option<u16>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["serve".into()];
    if let Some(port) = port {
        args.extend(["--port".into(), port.to_string().into()]);
    }
    if let Some(host) = host {
        args.extend(["--host".into(), host.into()]);
    }
    if let Some(store) = store {
        args.extend(["--store".into(), store.into()]);
    }
    args
}

/// Starts the server in its own process group with no stdio and reports
/// the child's pid.
#[cfg(unix)]
fn daemonize(args: Vec<OsString>) -> Res<ExitCode> {
    use std::os::unix::process::CommandExt;
    use std::process::Stdio;

    let exe = std::env::current_exe().wrap_err("error locating own executable")?;
    let child = std::process::Command::new(exe)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .wrap_err("error spawning server daemon")?;
    println!("{}", child.id());
    Ok(ExitCode::SUCCESS)
}

#[cfg(not(unix))]
fn daemonize(_args: Vec<OsString>) -> Res<ExitCode> {
    eyre::bail!("daemon mode is only supported on unix")
}

const CLAP_STYLE: clap::builder::Styles = clap::builder::Styles::styled()
    .header(AnsiColor::Yellow.on_default())
    .usage(AnsiColor::BrightBlue.on_default())
    .literal(AnsiColor::BrightBlue.on_default())
    .placeholder(AnsiColor::BrightBlue.on_default());

#[derive(Debug, clap::Parser)]
#[clap(
    version,
    about,
    styles = CLAP_STYLE
)]
struct Cli {
    /// Use this store file instead of the configured one.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List the tasks in the store or in a definition file.
    #[command(visible_alias = "ls")]
    List {
        /// Include tasks without a description.
        #[arg(short, long)]
        all: bool,
        /// A file, url or `-` for stdin. Anything that isn't readable
        /// is taken as a pattern over the store.
        source: Option<String>,
        /// Only show tasks whose name or description matches.
        pattern: Option<String>,
    },
    /// Install all or some tasks from a definition file.
    Install {
        /// Replace tasks that are already installed.
        #[arg(short, long)]
        force: bool,
        /// A file, url or `-` for stdin.
        source: String,
        /// Only install these tasks.
        tasks: Vec<String>,
    },
    /// Remove tasks from the store, printing them first.
    Uninstall {
        #[arg(required = true)]
        tasks: Vec<String>,
    },
    /// Print a task's definition. Takes `<task>` or `<file> <task>`,
    /// prints the whole store when given nothing.
    Examine {
        first: Option<String>,
        second: Option<String>,
    },
    /// Upload tasks to a paste service and print where they went.
    Publish {
        #[arg(required = true)]
        tasks: Vec<String>,
    },
    /// Serve the store over http.
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
        #[arg(long)]
        host: Option<String>,
        /// Detach and run in the background.
        #[arg(short, long)]
        daemon: bool,
    },
    /// Run an installed task through the execution engine.
    Run {
        task: String,
        /// Arguments for the task.
        args: Vec<String>,
    },
    /// Print the sake version.
    Version,
    /// Generate a shell completion script.
    Completions { shell: clap_complete::Shell },
    /// Print different resolved values to stdout.
    Print {
        #[command(subcommand)]
        commands: PrintCommands,
    },
}
