use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rendition_cdn::cdn::{create_redirect, S3ObjectStore};
use rendition_cdn::hosting::Credentials;
use rendition_cdn::models::Config;
use rendition_cdn::{Dispatcher, HostingConfig, UploadOptions};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "rendition-cdn")]
#[command(about = "Upload, delete and redirect CDN-hosted renditions")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render and upload every configured size of an image.
    Upload {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
        /// Hosting configuration (JSON).
        #[arg(long, value_name = "FILE")]
        hosting: PathBuf,
        #[arg(long, value_parser = parse_asset_id)]
        asset_id: String,
        /// Skip the reachability probe of the new serving urls.
        #[arg(long)]
        no_validate: bool,
        /// Replace the asset's serving urls instead of merging.
        #[arg(long)]
        servingurl_overwrite: bool,
        /// Keep objects that already exist under the same key.
        #[arg(long)]
        no_overwrite: bool,
    },
    /// Delete the object behind a serving url.
    Delete {
        #[arg(value_name = "URL")]
        url: String,
        #[arg(long, value_name = "FILE")]
        hosting: PathBuf,
    },
    /// Point SRC at DEST with an S3 website redirect.
    Redirect {
        #[arg(value_name = "DEST")]
        dest: String,
        #[arg(value_name = "SRC")]
        src: String,
        #[arg(long)]
        dest_bucket: Option<String>,
        #[arg(long)]
        src_bucket: Option<String>,
    },
}

fn parse_asset_id(input: &str) -> std::result::Result<String, String> {
    if input.split('_').filter(|part| !part.is_empty()).count() < 3 {
        return Err(format!(
            "Invalid asset id '{}'. Expected format: <account>_<video>_<thumb>",
            input
        ));
    }
    Ok(input.to_string())
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Upload {
            image,
            hosting,
            asset_id,
            no_validate,
            servingurl_overwrite,
            no_overwrite,
        } => {
            let hosting = HostingConfig::from_file(&hosting)
                .with_context(|| format!("loading {}", hosting.display()))?;
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("reading {}", image.display()))?;
            let source = rendition_cdn::image::decode(&bytes)?;

            let dispatcher = Dispatcher::new(hosting, config).await?;
            let options = UploadOptions {
                overwrite: no_overwrite.then_some(false),
                servingurl_overwrite,
                validate_urls: no_validate.then_some(false),
            };
            let outcomes = dispatcher.upload(source, &asset_id, &options).await?;
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
        }
        Command::Delete { url, hosting } => {
            let hosting = HostingConfig::from_file(&hosting)
                .with_context(|| format!("loading {}", hosting.display()))?;
            let dispatcher = Dispatcher::new(hosting, config).await?;
            dispatcher.delete(&url).await?;
            info!("Deleted {}", url);
        }
        Command::Redirect {
            dest,
            src,
            dest_bucket,
            src_bucket,
        } => {
            let store = S3ObjectStore::connect(&Credentials::Environment, None, None, &config).await?;
            create_redirect(
                &store,
                &config,
                &dest,
                &src,
                dest_bucket.as_deref(),
                src_bucket.as_deref(),
            )
            .await?;
            info!("Redirected {} to {}", src, dest);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rendition_cdn=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(args.command, config).await {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_asset_id_valid() {
        assert_eq!(
            parse_asset_id("acct1_vid1_tid1").unwrap(),
            "acct1_vid1_tid1"
        );
    }

    #[test]
    fn test_parse_asset_id_invalid() {
        let err = parse_asset_id("acct1").unwrap_err();
        assert!(err.contains("<account>_<video>_<thumb>"));
    }

    #[test]
    fn test_cli_parses_upload() {
        let args = CliArgs::parse_from([
            "rendition-cdn",
            "upload",
            "thumb.jpg",
            "--hosting",
            "hosting.json",
            "--asset-id",
            "acct1_vid1_tid1",
            "--no-validate",
        ]);
        match args.command {
            Command::Upload {
                asset_id,
                no_validate,
                no_overwrite,
                ..
            } => {
                assert_eq!(asset_id, "acct1_vid1_tid1");
                assert!(no_validate);
                assert!(!no_overwrite);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
