//! Muxup CLI — load declarative workspace files into live tmux sessions.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use muxup_core::attach::{AttachDecisionEngine, ConsolePrompt, LoadFlags, LoadOutcome};
use muxup_core::expand::expand;
use muxup_core::infrastructure::tmux::TmuxClient;
use muxup_core::plugin::PluginRegistry;
use muxup_core::trickle::trickle;
use muxup_core::types::raw;
use muxup_core::Error;


#[derive(Debug, Parser)]
#[command(name = "muxup", about = "Build tmux sessions from workspace files", version)]
struct Cli {
    /// tmux socket name (tmux -L)
    #[arg(short = 'L', long = "socket-name", global = true)]
    socket_name: Option<String>,

    /// tmux socket path (tmux -S)
    #[arg(short = 'S', long = "socket-path", global = true)]
    socket_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build the session described by a workspace file
    Load {
        /// Workspace file (YAML, or JSON with a .json extension)
        file: PathBuf,

        /// Build without attaching
        #[arg(short, long)]
        detached: bool,

        /// Append the windows to the current session
        #[arg(short, long)]
        append: bool,

        /// Answer yes to every interactive choice
        #[arg(short = 'y', long = "yes")]
        answer_yes: bool,
    },
    /// List sessions on the server
    List,
}


fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = TmuxClient::new()
        .with_socket_name(cli.socket_name)
        .with_socket_path(cli.socket_path);

    let result = match cli.command {
        Commands::Load {
            file,
            detached,
            append,
            answer_yes,
        } => cmd_load(
            client,
            &file,
            LoadFlags {
                detached,
                append,
                answer_yes,
            },
        ),
        Commands::List => cmd_list(&client),
    };

    if let Err(err) = result {
        eprintln!("muxup: {}", err);
        process::exit(1);
    }
}


fn cmd_load(mut client: TmuxClient, file: &Path, flags: LoadFlags) -> Result<(), Error> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| Error::validation(format!("cannot read {}: {}", file.display(), e)))?;
    let raw = if file.extension().is_some_and(|ext| ext == "json") {
        raw::from_json(&text)?
    } else {
        raw::from_yaml(&text)?
    };
    let spec = raw.into_spec()?;

    let cwd = file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let spec = trickle(expand(&spec, &cwd));

    // Plugin resolution stays external; an empty registry means every
    // workspace plugin reference is reported as unknown.
    let registry = PluginRegistry::new();
    let candidates = registry.resolve(&spec.plugins)?;

    let mut prompt = ConsolePrompt::default();
    let inside_client = TmuxClient::inside_client();
    let mut engine = AttachDecisionEngine::new(&mut client, &mut prompt, inside_client);
    let outcome = engine.load(&spec, candidates, &flags)?;

    match outcome {
        LoadOutcome::ExistingAttached(name) => {
            println!("attached to existing session '{}'", name);
        }
        LoadOutcome::ExistingNotAttached(name) => {
            println!("session '{}' already exists, not attaching", name);
        }
        LoadOutcome::BuiltDetached(session) => {
            println!("session '{}' built (detached)", session.name);
        }
        LoadOutcome::BuiltAttached(session) | LoadOutcome::BuiltSwitched(session) => {
            println!("session '{}' built", session.name);
        }
        LoadOutcome::Appended(session) => {
            println!("windows appended to session '{}'", session.name);
        }
        LoadOutcome::BuildFailed { failure, recovery } => {
            eprintln!("muxup: build failed: {}", failure.error);
            tracing::info!(?recovery, "recovery applied");
            process::exit(1);
        }
    }
    Ok(())
}


fn cmd_list(client: &TmuxClient) -> Result<(), Error> {
    for name in client.list_sessions() {
        println!("{}", name);
    }
    Ok(())
}
