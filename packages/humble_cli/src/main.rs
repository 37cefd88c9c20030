//! A CLI for managing Humble Bundle purchases.
//!
//! It lists purchased bundles and choice months, shows bundle details, searches
//! products by name and downloads bundle items with resumable, retrying transfers.
//! Bundle data is fetched in concurrent batches. Settings come from an optional
//! YAML file and the session key is stored in the user's home directory.

mod api;
mod choices;
mod commands;
mod config;
mod decode;
mod download;
mod error;
mod key_match;
mod models;
mod select;
mod session;
mod utils;

use anyhow::{Context, Result};
use api::HumbleApi;
use clap::Parser;
use config::{Args, Command, Settings};
use download::Downloader;
use log::debug;
use session::SessionStore;
use std::path::Path;

/// Builds an API client from the stored session key
fn connect(store: &SessionStore, settings: &Settings) -> Result<HumbleApi> {
    let session_key = store.load()?;
    HumbleApi::new(&session_key, settings).context("Failed to create HTTP client")
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;
    debug!("Settings: {:?}", settings);

    let store = SessionStore::in_home_dir()?;
    let root = Path::new(".");

    match args.command {
        Command::Auth { session_key } => commands::auth(&store, &session_key),
        Command::List { fields, claimed } => {
            let api = connect(&store, &settings)?;
            commands::list_bundles(&api, &fields, claimed).await
        }
        Command::ListChoices { period } => {
            let api = connect(&store, &settings)?;
            commands::list_choices(&api, &period).await
        }
        Command::Details { bundle_key } => {
            let api = connect(&store, &settings)?;
            commands::details(&api, &bundle_key).await
        }
        Command::Search { keywords, mode } => {
            let api = connect(&store, &settings)?;
            commands::search(&api, &keywords, mode).await
        }
        Command::Download {
            bundle_key,
            item_numbers,
            options,
        } => {
            let api = connect(&store, &settings)?;
            let downloader = Downloader::new(&settings)?;
            commands::download_bundle(&api, &downloader, &bundle_key, item_numbers, &options, root)
                .await
        }
        Command::BulkDownload { input, options } => {
            let api = connect(&store, &settings)?;
            let downloader = Downloader::new(&settings)?;
            commands::bulk_download(&api, &downloader, &input, &options, root).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use session::SessionError;

    #[test]
    fn connect_needs_a_stored_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join(".humble-cli-key"));
        let settings = Settings::default();

        let err = connect(&store, &settings).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::NotConfigured(_))
        ));

        commands::auth(&store, "secret").unwrap();
        assert!(connect(&store, &settings).is_ok());
    }
}
