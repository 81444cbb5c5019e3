use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "jobline")]
#[command(about = "Cron-driven job scheduler", long_about = None)]
pub struct Cli {
    /// Config file (falls back to $JOBLINE_CONFIG, then ~/.jobline/jobline.toml)
    #[arg(long, short, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the scheduler until Ctrl-C (default)
    Run,

    /// Validate configured jobs and print their upcoming fire times as JSON
    Check {
        /// Fire times to list per job
        #[arg(long, default_value_t = 3)]
        count: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_is_the_default() {
        let cli = Cli::try_parse_from(["jobline"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn check_takes_a_count_and_global_config() {
        let cli =
            Cli::try_parse_from(["jobline", "check", "--count", "5", "--config", "/etc/jobline.toml"])
                .unwrap();
        assert_eq!(cli.command, Some(Command::Check { count: 5 }));
        assert_eq!(cli.config.as_deref(), Some("/etc/jobline.toml"));
    }
}
