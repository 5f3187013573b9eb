use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use converge::DocumentFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clusterup")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge cluster infrastructure from a declarative task list", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Cluster configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "CLUSTERUP_CONFIG",
        default_value = crate::config::DEFAULT_CONFIG
    )]
    pub config: PathBuf,

    /// Provider state file (overrides `state` in the config)
    #[arg(long, global = true, env = "CLUSTERUP_STATE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what apply would change
    Plan(PlanArgs),

    /// Create, update and delete resources until they match the config
    Apply(ApplyArgs),

    /// Write a Terraform or CloudFormation document instead of calling APIs
    Render(RenderArgs),

    /// Exit non-zero if any resource differs from the config
    Validate(PlanArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Parallel discovery workers
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Parallel discovery workers
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Document format
    #[arg(short, long, value_enum, default_value_t = DocumentFormatArg::Terraform)]
    pub format: DocumentFormatArg,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DocumentFormatArg {
    Terraform,
    Cloudformation,
}

impl From<DocumentFormatArg> for DocumentFormat {
    fn from(arg: DocumentFormatArg) -> Self {
        match arg {
            DocumentFormatArg::Terraform => Self::Terraform,
            DocumentFormatArg::Cloudformation => Self::CloudFormation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_render_args() {
        let cli = Cli::parse_from([
            "clusterup",
            "--config",
            "prod.toml",
            "render",
            "-f",
            "cloudformation",
            "-o",
            "stack.json",
        ]);
        assert_eq!(cli.config, PathBuf::from("prod.toml"));
        let Command::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(DocumentFormat::from(args.format), DocumentFormat::CloudFormation);
        assert_eq!(args.out, Some(PathBuf::from("stack.json")));
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::parse_from(["clusterup", "apply", "-y", "-j", "8", "-vv"]);
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert!(args.yes);
        assert_eq!(args.jobs, Some(8));
    }
}
