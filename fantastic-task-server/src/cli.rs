use clap::{Parser, Subcommand};

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/app.db)
  PORT        (default: 5270 or config.listen_port)

The `hash-password` command generates a bcrypt hash for the `users`
section of the config file.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "fantastic-task-server",
    version,
    about = "Fantastic Task server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Optional subcommand. Without one, runs the server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a bcrypt hash of the given password for use in config.yaml
    HashPassword {
        /// Password to hash
        password: String,
    },
}
