//! Stacked-branch workflows for git.
//!
//! Every command runs as a resumable program: when a step conflicts the run
//! pauses (`continue`, `skip`, `abort`), and a finished run can be reverted
//! with `undo`.

use std::path::Path;

use anyhow::{Context, Result};
use branchwise::compress::{CompressOptions, compress};
use branchwise::core::branch_type::BranchType;
use branchwise::error::RunStopped;
use branchwise::exit_codes;
use branchwise::io::git::Git;
use branchwise::io::init::{InitOptions, StatePaths, init_config};
use branchwise::session::{Session, SessionOptions, report};
use branchwise::ship::{ShipOptions, ship};
use branchwise::sync::{SyncScope, sync};
use branchwise::vm::Outcome;
use branchwise::{hack, kill, logging, propose, resume, roles, status, undo};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "branchwise",
    version,
    about = "Stacked-branch workflows with continue, abort and undo"
)]
struct Cli {
    /// Enable debug logs on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the git commands a run would execute without running them.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the configuration file for this repository.
    Init {
        /// Overwrite an existing configuration file.
        #[arg(short, long)]
        force: bool,
        /// Name of the main branch.
        #[arg(long)]
        main: Option<String>,
        /// Additional long-lived branches (repeatable).
        #[arg(long, value_name = "BRANCH")]
        perennial: Vec<String>,
    },
    /// Create a new feature branch off main and switch to it.
    Hack { branch: String },
    /// Create a new branch as a child of the current branch.
    Append { branch: String },
    /// Change the parent of the current branch.
    SetParent { parent: String },
    /// Update branches from their tracking branch and their parent.
    Sync(SyncArgs),
    /// Squash the commits of a branch into one.
    Compress {
        /// Compress every branch in the current stack.
        #[arg(long)]
        stack: bool,
        /// Message for the squashed commit.
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Delete a branch locally and remotely.
    Kill { branch: Option<String> },
    /// Squash-merge a feature branch into its perennial parent and delete it.
    Ship {
        branch: Option<String>,
        /// Message for the squashed commit.
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Push the current branch and print the link that opens a proposal.
    Propose,
    /// Print the repository's web URL.
    Repo,
    /// Stop syncing a branch with its parent.
    Park { branch: Option<String> },
    /// Track someone else's branch without pushing to it.
    Observe { branch: Option<String> },
    /// Contribute to someone else's branch: sync and push, never ship.
    Contribute { branch: Option<String> },
    /// Continue a paused run after resolving the conflicts.
    Continue,
    /// Skip the branch a paused run stopped on.
    Skip,
    /// Roll a paused run back to where it started.
    Abort,
    /// Revert the last completed run.
    Undo,
    /// Describe the last run.
    Status,
}

#[derive(Args)]
#[group(multiple = false)]
struct SyncArgs {
    /// Sync every branch in the current stack.
    #[arg(long)]
    stack: bool,
    /// Sync every local branch.
    #[arg(long)]
    all: bool,
}

impl SyncArgs {
    fn scope(&self) -> SyncScope {
        if self.all {
            SyncScope::All
        } else if self.stack {
            SyncScope::Stack
        } else {
            SyncScope::Current
        }
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("{err:#}");
        std::process::exit(exit_code(&err));
    }
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("determine current directory")?;
    let options = SessionOptions {
        dry_run: cli.dry_run,
        echo_commands: true,
    };
    let open = || Session::open(&cwd, &options);
    let outcome: Outcome = match cli.command {
        Command::Init {
            force,
            main,
            perennial,
        } => return cmd_init(&cwd, force, main, perennial),
        Command::Hack { branch } => hack::hack(&mut open()?, &branch)?,
        Command::Append { branch } => hack::append(&mut open()?, &branch)?,
        Command::SetParent { parent } => hack::set_parent(&mut open()?, &parent)?,
        Command::Sync(args) => sync(&mut open()?, args.scope())?,
        Command::Compress { stack, message } => {
            compress(&mut open()?, &CompressOptions { stack, message })?
        }
        Command::Kill { branch } => kill::kill(&mut open()?, branch.as_deref())?,
        Command::Ship { branch, message } => ship(&mut open()?, &ShipOptions { branch, message })?,
        Command::Propose => return propose::propose(&mut open()?),
        Command::Repo => return propose::repo(&mut open()?),
        Command::Park { branch } => {
            roles::set_role(&mut open()?, branch.as_deref(), BranchType::Parked)?
        }
        Command::Observe { branch } => {
            roles::set_role(&mut open()?, branch.as_deref(), BranchType::Observed)?
        }
        Command::Contribute { branch } => {
            roles::set_role(&mut open()?, branch.as_deref(), BranchType::Contribution)?
        }
        Command::Continue => resume::resume(&mut open()?)?,
        Command::Skip => resume::skip(&mut open()?)?,
        Command::Abort => resume::abort(&mut open()?)?,
        Command::Undo => undo::undo(&mut open()?)?,
        Command::Status => return status::status(&open()?),
    };
    report(outcome)
}

fn cmd_init(cwd: &Path, force: bool, main: Option<String>, perennial: Vec<String>) -> Result<()> {
    let git = Git::open(cwd).context("open git repository")?;
    let paths = StatePaths::new(git.git_common_dir().context("locate git directory")?);
    let config = init_config(
        &paths,
        &InitOptions {
            force,
            main,
            perennial,
        },
    )?;
    println!(
        "wrote {} (main branch: {})",
        paths.config_path.display(),
        config.branches.main
    );
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<RunStopped>() {
        Some(RunStopped::Paused { .. }) => exit_codes::PAUSED,
        Some(RunStopped::RolledBack { .. }) => exit_codes::ABORTED,
        None => exit_codes::INVALID,
    }
}
