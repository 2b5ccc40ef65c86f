#![allow(clippy::cargo_common_metadata)]

use clap::{Parser, Subcommand};
use color_eyre::Result;
use xshell::{cmd, Shell};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Fmt,
    Check,
    Clippy,
    Run,
    Test,
    Doc,
    PreCommit,
    /// Run only the native unit and integration tests
    TestNative,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let sh = Shell::new()?;

    match &cli.command {
        Command::Fmt => fmt(&sh)?,
        Command::Check => check(&sh)?,
        Command::Clippy => clippy(&sh)?,
        Command::Run => run(&sh)?,
        Command::Test => test(&sh)?,
        Command::Doc => doc(&sh)?,
        Command::PreCommit => pre_commit(&sh)?,
        Command::TestNative => test_native(&sh)?,
    };

    Ok(())
}

fn fmt(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo +nightly fmt").run()?)
}

fn check(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo check --all-targets --all-features --workspace").run()?)
}

fn clippy(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo clippy --all-targets --all-features --workspace").run()?)
}

fn run(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo run --package camview-signaling-server").run()?)
}

fn test_native(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo test --workspace --exclude xtask").run()?)
}

fn test(sh: &Shell) -> Result<()> {
    test_native(sh)?;
    let _dir = sh.push_dir(project_root::get_project_root()?.join("library/"));
    cmd!(sh, "wasm-pack test --headless --firefox").run()?;
    cmd!(sh, "wasm-pack test --headless --chrome").run()?;
    Ok(())
}

fn doc(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo doc --no-deps --all-features").run()?)
}

fn pre_commit(sh: &Shell) -> Result<()> {
    for cmd in [fmt, check, test, doc] {
        cmd(sh)?;
    }
    Ok(())
}
