use clap::{Parser, Subcommand};

/// `fleetsync` - device-agent policy and command synchronization.
#[derive(Parser, Debug)]
#[command(name = "fleetsync")]
#[command(version)]
#[command(about = "Synchronizes device policy and commands with a management backend.", long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one sync cycle: policy, inbox, commands, acks
    Sync,

    /// Register the push token with the backend now
    PushToken,

    /// Run the long-lived agent (periodic sync and retry jobs)
    Daemon,

    /// Show enrolment, policy and push-token state
    Status,

    /// Fetch fresh MQTT credentials from the backend
    RefreshCredentials,

    /// Report that the user changed their password
    PasswordChanged,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["fleetsync", "sync"]).unwrap();
        assert!(matches!(cli.command, Commands::Sync));
        assert!(!cli.verbose);

        let cli = Cli::try_parse_from(["fleetsync", "push-token", "--verbose"]).unwrap();
        assert!(matches!(cli.command, Commands::PushToken));
        assert!(cli.verbose);

        let cli = Cli::try_parse_from(["fleetsync", "refresh-credentials"]).unwrap();
        assert!(matches!(cli.command, Commands::RefreshCredentials));
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["fleetsync", "reboot"]).is_err());
    }

    #[test]
    fn command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
