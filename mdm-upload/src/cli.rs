///
/// This module implements the CLI interface for mdm-upload: command parsing,
/// argument definitions and the async entrypoint shared by `main()` and the
/// integration tests.
///
/// All workflow logic (transport, upload and attach loop, release gating)
/// lives in the [`mdm-upload-core`] crate. This module is strictly glue:
/// load configuration, build the transport, call into the core, print.
///
/// ## Commands
/// - `get-app`, `list-apps`, `update-app` against the custom app library
/// - `release verify|prepare|publish`, invoked by a release tool's exec hooks
///
/// [`mdm-upload-core`]: ../../mdm-upload-core/
use crate::load_config::{load_config, load_release_settings, load_script_lines, release_env};
use crate::output::{render_app, render_apps};
use anyhow::Result;
use clap::{Parser, Subcommand};
use mdm_upload_core::config::AttachPolicy;
use mdm_upload_core::contract::Transport;
use mdm_upload_core::release::{self, PublishOutcome};
use mdm_upload_core::transport::HttpTransport;
use mdm_upload_core::upload::upload_with_postinstall;
use mdm_upload_core::Error;
use std::path::PathBuf;

/// CLI for mdm-upload: manage custom app uploads in a device-management library.
#[derive(Parser)]
#[clap(
    name = "mdm-upload",
    version,
    about = "Upload build artifacts to a device-management custom app library"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show a single custom app
    GetApp {
        /// Path to the config file
        #[clap(long)]
        config: PathBuf,
        /// Custom app id
        #[clap(long)]
        id: String,
        /// Print the raw record as JSON
        #[clap(long)]
        json: bool,
    },
    /// List all custom apps
    ListApps {
        /// Path to the config file
        #[clap(long)]
        config: PathBuf,
        /// Print the records as JSON
        #[clap(long)]
        json: bool,
    },
    /// Upload a file and attach it to a custom app
    UpdateApp {
        /// Path to the config file
        #[clap(long)]
        config: PathBuf,
        /// Custom app id
        #[clap(long)]
        id: String,
        /// Build artifact to upload
        #[clap(long)]
        file: PathBuf,
        /// Text file with the post-install script to set after the upload
        #[clap(long)]
        postinstall: Option<PathBuf>,
        /// Print the updated record as JSON
        #[clap(long)]
        json: bool,
    },
    /// Release-automation hooks
    Release {
        #[clap(subcommand)]
        step: ReleaseStep,
    },
}

#[derive(Subcommand)]
pub enum ReleaseStep {
    /// Check that settings and environment are complete
    Verify {
        /// Path to the release settings file
        #[clap(long)]
        config: PathBuf,
    },
    /// Resolve the release asset for a version
    Prepare {
        /// Path to the release settings file
        #[clap(long)]
        config: PathBuf,
        /// Version being released
        #[clap(long)]
        version: String,
    },
    /// Upload the release asset, if enabled for this branch
    Publish {
        /// Path to the release settings file
        #[clap(long)]
        config: PathBuf,
        /// Version being released
        #[clap(long)]
        version: String,
        /// The current branch is a pre-release branch
        #[clap(long)]
        prerelease_branch: bool,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::GetApp { config, id, json } => {
            let transport = HttpTransport::new(&load_config(config)?)?;
            tracing::info!(command = "get-app", app_id = %id, "Fetching app");
            let app = transport.get_app(&id).await?;
            println!("{}", render_app(&app, json)?);
            Ok(())
        }
        Commands::ListApps { config, json } => {
            let transport = HttpTransport::new(&load_config(config)?)?;
            tracing::info!(command = "list-apps", "Listing apps");
            let apps = transport.list_apps().await?;
            println!("{}", render_apps(&apps, json)?);
            Ok(())
        }
        Commands::UpdateApp {
            config,
            id,
            file,
            postinstall,
            json,
        } => {
            let transport = HttpTransport::new(&load_config(config)?)?;
            let script = match postinstall {
                Some(path) => load_script_lines(path)?,
                None => Vec::new(),
            };
            tracing::info!(command = "update-app", app_id = %id, file = %file.display(), "Starting upload");
            let policy = AttachPolicy::default();
            policy.trace_loaded();
            let app = upload_with_postinstall(&transport, &policy, &file, &id, &script).await?;
            if !json {
                println!("Upload complete.");
            }
            println!("{}", render_app(&app, json)?);
            Ok(())
        }
        Commands::Release { step } => run_release(step).await,
    }
}

async fn run_release(step: ReleaseStep) -> Result<()> {
    match step {
        ReleaseStep::Verify { config } => {
            let settings = load_release_settings(config)?;
            let verified = release::verify_conditions(&settings, &release_env())?;
            println!("Release conditions verified for app {}.", verified.app_id);
            Ok(())
        }
        ReleaseStep::Prepare { config, version } => {
            let settings = load_release_settings(config)?;
            let verified = release::verify_conditions(&settings, &release_env())?;
            let asset = release::prepare(&verified, &version)?;
            println!("{}", asset.display());
            Ok(())
        }
        ReleaseStep::Publish {
            config,
            version,
            prerelease_branch,
        } => {
            let settings = load_release_settings(config)?;
            let verified = release::verify_conditions(&settings, &release_env())?;
            let transport = HttpTransport::new(&verified.client)?;
            let outcome = release::publish(
                &transport,
                &AttachPolicy::default(),
                &verified,
                &version,
                prerelease_branch,
            )
            .await?;
            match outcome {
                PublishOutcome::Skipped => {
                    println!("Skipped: publishing is disabled for this branch.")
                }
                PublishOutcome::Published(app) => {
                    println!("Published {version} to app {}.", app.id)
                }
            }
            Ok(())
        }
    }
}

/// Print a failure for the user. Partial failures get a hint naming the
/// step that still needs repeating.
pub fn report_failure(err: &anyhow::Error) {
    eprintln!("[ERROR] {err:#}");
    match err.downcast_ref::<Error>() {
        Some(Error::Unattached { app_id, file_key, .. }) => eprintln!(
            "[ERROR] The upload reached storage (file key {file_key}) but app {app_id} was not updated; \
             check the app and retry attaching that file key."
        ),
        Some(Error::PostinstallScript { app_id, file_key, .. }) => eprintln!(
            "[ERROR] App {app_id} now uses file key {file_key}; only the post-install script \
             needs to be applied again."
        ),
        _ => {}
    }
}
