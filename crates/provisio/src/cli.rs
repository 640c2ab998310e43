//! CLI definitions using clap

use camino::Utf8PathBuf;
use clap::{ArgAction, Args, Parser, Subcommand};

/// Provisio - resilient provisioning of remote resources
#[derive(Parser, Debug)]
#[command(name = "provisio")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors; command output is still printed
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Resilience config file layered over ~/.provisio/resilience.yaml
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect the resilience configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Run a provisioning workflow against an in-memory platform
    Simulate(SimulateArgs),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration after all layers are merged
    Show(ConfigShowArgs),

    /// Load and validate the configuration
    Validate,
}

#[derive(Args, Debug)]
pub struct ConfigShowArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of provisioning steps (workspace, dataset, then role bindings)
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(2..=20))]
    pub steps: u32,

    /// Step whose create call is permanently rejected
    #[arg(long, value_name = "STEP")]
    pub fail_at: Option<u32>,

    /// Transient failures every platform call returns before it succeeds
    #[arg(long, value_name = "K", default_value_t = 0)]
    pub flaky: u32,

    /// Step whose resource can never be deleted
    #[arg(long, value_name = "STEP")]
    pub stuck_cleanup: Option<u32>,

    /// Base name of the provisioned workspace
    #[arg(long, default_value = "analytics")]
    pub name: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_simulate_defaults() {
        let cli = Cli::try_parse_from(["provisio", "simulate"]).unwrap();
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.steps, 3);
                assert_eq!(args.flaky, 0);
                assert!(args.fail_at.is_none());
                assert!(!args.json);
            }
            other => panic!("expected simulate, got {:?}", other),
        }
    }

    #[test]
    fn test_quiet_help_describes_log_level() {
        let command = Cli::command();
        let quiet = command
            .get_arguments()
            .find(|arg| arg.get_id() == "quiet")
            .unwrap();
        let help = quiet.get_help().unwrap().to_string();
        assert!(help.contains("Only log errors"), "{}", help);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["provisio", "config", "show", "-vv", "-c", "ops.yaml"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config.as_deref().map(|p| p.as_str()), Some("ops.yaml"));
    }

    #[test]
    fn test_steps_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["provisio", "simulate", "--steps", "1"]).is_err());
    }
}
