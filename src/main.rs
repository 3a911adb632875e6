use clap::Parser;
use tracing_subscriber::EnvFilter;

use bathinov_focus::cli::{Cli, Commands};
use bathinov_focus::commands::{analyze_image, annotate_image};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            image,
            format,
            roi,
            options,
        } => {
            analyze_image(&image, &format, roi.as_deref(), &options)?;
        }
        Commands::Annotate {
            image,
            output,
            min_visible_offset,
            options,
        } => {
            annotate_image(&image, &output, min_visible_offset, &options)?;
        }
    }

    Ok(())
}
