use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "legal")]
#[command(about = "Inspect crucial legal policies and check user compliance")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML config file (defaults to ./legal.toml if present)
    #[arg(short, long, global = true, env = "LEGAL_CONFIG")]
    pub config: Option<String>,

    /// Policy service base URL (overrides config)
    #[arg(short, long, global = true, env = "LEGAL_BASE_URL")]
    pub base_url: Option<String>,

    /// Publisher namespace (overrides config)
    #[arg(short, long, global = true)]
    pub publisher_namespace: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the crucial policy versions currently published
    Policies(PoliciesArgs),
    /// Check whether a user has accepted every crucial policy
    Check(CheckArgs),
    /// Prime the cache and report client health
    Health,
}

#[derive(clap::Args)]
pub struct PoliciesArgs {
    /// Only show one scope (a client ID, or "all")
    #[arg(long)]
    pub scope: Option<String>,
}

#[derive(clap::Args)]
pub struct CheckArgs {
    /// OAuth client the user authenticated through
    #[arg(long)]
    pub client_id: String,
    /// The user's country
    #[arg(long)]
    pub country: String,
    /// Namespace the user authenticated against
    #[arg(long)]
    pub namespace: String,
    /// Accepted policy versions, comma separated
    #[arg(long, value_delimiter = ',')]
    pub accepted: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_check_with_accepted_list() {
        let cli = Cli::try_parse_from([
            "legal",
            "--base-url",
            "http://localhost:8080",
            "check",
            "--client-id",
            "web",
            "--country",
            "US",
            "--namespace",
            "game",
            "--accepted",
            "tos-v1,privacy-v2",
        ])
        .unwrap();

        assert_eq!(cli.base_url.as_deref(), Some("http://localhost:8080"));
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.client_id, "web");
                assert_eq!(args.accepted, vec!["tos-v1", "privacy-v2"]);
            }
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["legal", "policies", "--scope", "all", "--debug"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(
            cli.command,
            Commands::Policies(PoliciesArgs { scope: Some(ref s) }) if s == "all"
        ));
    }

    #[test]
    fn check_requires_identity() {
        assert!(Cli::try_parse_from(["legal", "check", "--country", "US"]).is_err());
    }
}
