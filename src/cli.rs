use crate::db::Rank;

/// Daily phrase elimination game server.
#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
pub(crate) struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(clap::Subcommand, Debug, Default)]
pub(crate) enum Command {
    /// Runs the server (default)
    #[default]
    Run,
    /// Resets the database
    Reset,
    /// Migrates the database to the latest schema
    Migrate,
    /// Evaluates every unevaluated opened window and schedules the next one
    Rollover,
    /// Schedules the next submission window if none is pending
    EnsureWindow,
    /// Creates a user and prints a sign-in token for them
    CreateUser {
        name: String,
        #[arg(long, value_enum, default_value = "normal")]
        rank: Rank,
    },
    /// Prints a new sign-in token for an existing user
    IssueToken { name: String },
}
