use crate::api::HumbleApi;
use crate::config::DownloadArgs;
use crate::download::{DownloadOutcome, Downloader};
use crate::error::explain;
use crate::key_match::{self, FULL_KEY_SIZE};
use crate::models::{Bundle, ChoicePeriod, ClaimFilter, ClaimStatus, Item, MatchMode};
use crate::select::{ItemFilter, select_items};
use crate::session::SessionStore;
use crate::utils::bytes::{humanize_bytes, parse_size};
use crate::utils::file::{create_dir, filename_from_url, sanitize_filename};
use crate::utils::table::{Align, Formatter};

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use std::io::Read;
use std::path::Path;

const KEYS_URL: &str = "https://www.humblebundle.com/home/keys";
const CHOICES_URL: &str = "https://www.humblebundle.com/membership/home";

pub fn auth(store: &SessionStore, session_key: &str) -> Result<()> {
    store.save(session_key)?;
    info!("Session key saved to {}", store.path().display());
    Ok(())
}

/// Resolves a partial bundle key, listing the user's keys only when needed
async fn resolve_bundle_key(api: &HumbleApi, input: &str) -> Result<String> {
    let keys = if input.len() == FULL_KEY_SIZE {
        vec![]
    } else {
        api.list_identifiers().await.map_err(explain)?
    };
    Ok(key_match::resolve(&keys, input)?)
}

pub async fn list_bundles(api: &HumbleApi, fields: &[String], claimed: ClaimFilter) -> Result<()> {
    let fields: Vec<String> = fields.iter().map(|f| f.to_lowercase()).collect();

    // Bare keys need neither bundle details nor claim data
    if fields == ["key"] && claimed == ClaimFilter::All {
        for key in api.list_identifiers().await.map_err(explain)? {
            println!("{key}");
        }
        return Ok(());
    }

    let mut bundles = api.list_bundles().await.map_err(explain)?;
    bundles.retain(|b| claimed.accepts(b.claim_status()));

    if !fields.is_empty() {
        print!("{}", bundles_csv(&fields, &bundles)?);
        return Ok(());
    }

    println!("{} bundle(s) found.\n", bundles.len());
    if bundles.is_empty() {
        return Ok(());
    }

    let mut table = Formatter::new(["Key", "Name", "Size", "Claimed"])
        .align(1, Align::Left)
        .align(2, Align::Right);
    for bundle in &bundles {
        table.push([
            bundle.gamekey().to_owned(),
            bundle.details.human_name.clone(),
            humanize_bytes(bundle.total_size()),
            bundle.claim_status().to_string(),
        ]);
    }
    println!("{}", table.render());
    Ok(())
}

/// Renders one CSV row per bundle with the requested fields, in the requested order
fn bundles_csv(fields: &[String], bundles: &[Bundle]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    for bundle in bundles {
        let mut record = Vec::with_capacity(fields.len());
        for field in fields {
            record.push(match field.as_str() {
                "key" => bundle.gamekey().to_owned(),
                "name" => bundle.details.human_name.clone(),
                "size" => humanize_bytes(bundle.total_size()),
                "claimed" => bundle.claim_status().to_string(),
                other => bail!("invalid field: {other}"),
            });
        }
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .context("Failed to write CSV output")?;
    Ok(String::from_utf8(bytes)?)
}

pub async fn list_choices(api: &HumbleApi, period: &ChoicePeriod) -> Result<()> {
    let choices = api.read_bundle_choices(period).await.map_err(explain)?;
    let options = choices.options;

    println!();
    println!("{}", options.title);
    println!();

    let mut table = Formatter::new(["#", "Title", "Redeemed"])
        .align(0, Align::Right)
        .align(1, Align::Left);
    let mut all_redeemed = true;
    let tpkds = options.data.game_data.values().flat_map(|game| &game.tpkds);
    for (idx, tpkd) in tpkds.enumerate() {
        let status = tpkd.claim_status();
        if status == ClaimStatus::No {
            all_redeemed = false;
        }
        table.push([(idx + 1).to_string(), tpkd.human_name.clone(), status.to_string()]);
    }

    if table.is_empty() {
        println!("No keys in this period.");
        return Ok(());
    }
    println!("{}", table.render());

    if !all_redeemed {
        println!("Visit {CHOICES_URL} to redeem your keys.");
    }
    Ok(())
}

pub async fn details(api: &HumbleApi, bundle_key: &str) -> Result<()> {
    let bundle_key = resolve_bundle_key(api, bundle_key).await?;
    let bundle = api.fetch_one(&bundle_key).await.map_err(explain)?;

    println!();
    println!("{}", bundle.details.human_name);
    println!();
    if !bundle.created.is_unset() {
        println!("Purchased    : {}", bundle.created);
    }
    if let (Some(amount), Some(currency)) = (bundle.amount_spent, bundle.currency.as_deref()) {
        println!("Amount spent : {amount} {currency}");
    }
    println!("Total size   : {}", humanize_bytes(bundle.total_size()));
    println!();

    if bundle.items.is_empty() {
        println!("No items to show.");
    } else {
        let mut table = Formatter::new(["#", "Sub-item", "Format", "Total Size"])
            .align(0, Align::Right)
            .align(1, Align::Left)
            .align(2, Align::Left)
            .align(3, Align::Right);
        for (idx, item) in bundle.items.iter().enumerate() {
            table.push([
                (idx + 1).to_string(),
                item.human_name.clone(),
                item.formats(),
                humanize_bytes(item.total_size()),
            ]);
        }
        println!("{}", table.render());
    }

    let keys = bundle.product_keys();
    if keys.is_empty() {
        return Ok(());
    }

    println!();
    println!("Keys in this bundle:");
    println!();
    let mut table = Formatter::new(["#", "Key Name", "Redeemed"])
        .align(0, Align::Right)
        .align(1, Align::Left)
        .align(2, Align::Center);
    for (idx, key) in keys.iter().enumerate() {
        table.push([
            (idx + 1).to_string(),
            key.human_name.clone(),
            if key.redeemed { "Yes" } else { "No" }.to_owned(),
        ]);
    }
    println!("{}", table.render());

    if keys.iter().any(|k| !k.redeemed) {
        println!("Visit {KEYS_URL} to redeem your keys.");
    }
    Ok(())
}

/// Items of every bundle whose name matches the keywords
fn search_matches<'a>(
    bundles: &'a [Bundle],
    keywords: &[&str],
    mode: MatchMode,
) -> Vec<(&'a Bundle, &'a Item)> {
    bundles
        .iter()
        .flat_map(|b| b.items.iter().map(move |item| (b, item)))
        .filter(|(_, item)| item.name_matches(keywords, mode))
        .collect()
}

pub async fn search(api: &HumbleApi, keywords: &[String], mode: MatchMode) -> Result<()> {
    let keywords = keywords.join(" ").to_lowercase();
    let keywords: Vec<&str> = keywords.split_whitespace().collect();

    let bundles = api.list_bundles().await.map_err(explain)?;
    let matches = search_matches(&bundles, &keywords, mode);
    if matches.is_empty() {
        println!("Nothing found");
        return Ok(());
    }

    let mut table = Formatter::new(["Key", "Name", "Sub Item"])
        .align(1, Align::Left)
        .align(2, Align::Left)
        .merge_vertical();
    for (bundle, item) in matches {
        table.push([
            bundle.gamekey(),
            bundle.details.human_name.as_str(),
            item.human_name.as_str(),
        ]);
    }
    println!("{}", table.render());
    Ok(())
}

fn item_filter(options: &DownloadArgs, item_numbers: Option<String>) -> Result<ItemFilter> {
    let max_size = match options.max_size.as_deref() {
        Some(size) => parse_size(size)?,
        None => 0,
    };
    Ok(ItemFilter::new(&options.formats, max_size, item_numbers))
}

/// Downloads the selected items of one bundle below `root`.
///
/// Files go to `<bundle name>/<item name>/`, or to `<item name>/` with `cur_dir`.
pub async fn download_bundle(
    api: &HumbleApi,
    downloader: &Downloader,
    bundle_key: &str,
    item_numbers: Option<String>,
    options: &DownloadArgs,
    root: &Path,
) -> Result<()> {
    let filter = item_filter(options, item_numbers)?;
    let bundle_key = resolve_bundle_key(api, bundle_key).await?;
    let bundle = api.fetch_one(&bundle_key).await.map_err(explain)?;

    let items = select_items(&bundle.items, &filter)?;
    if items.is_empty() {
        println!("Nothing to download");
        return Ok(());
    }

    let bundle_dir = if options.cur_dir {
        root.to_path_buf()
    } else {
        create_dir(&root.join(sanitize_filename(&bundle.details.human_name)))?
    };
    debug!(
        "Downloading {} item(s) of {} into {}",
        items.len(),
        bundle_key,
        bundle_dir.display()
    );

    for item in items {
        println!();
        println!("{}", item.human_name);

        let item_dir = create_dir(&bundle_dir.join(sanitize_filename(&item.human_name)))?;

        for file in item.files() {
            if !filter.accepts_file(file) {
                println!("  Skipping '{}'", file.format);
                continue;
            }

            let (url, expected_size) = if options.torrents {
                let Some(url) = file.url.bittorrent.as_deref() else {
                    println!("  No torrent for '{}'", file.format);
                    continue;
                };
                (url, 0)
            } else {
                (file.url.web.as_str(), file.file_size)
            };

            let filename = filename_from_url(url)
                .with_context(|| format!("Cannot get file name from URL '{url}'"))?;
            let outcome = downloader
                .download(url, &item_dir.join(&filename), &filename, expected_size)
                .await
                .with_context(|| format!("Failed to download '{filename}'"))?;
            if let DownloadOutcome::Completed { bytes } = outcome {
                debug!("Wrote {bytes} bytes to {filename}");
            }
        }
    }

    Ok(())
}

/// One line of a bulk download input file
#[derive(Debug, PartialEq, Eq)]
struct BulkEntry {
    key: String,
    name: String,
}

/// Reads `key[,name]` lines, as written by `list --field key,name`
fn read_bulk_input<R: Read>(reader: R) -> Result<Vec<BulkEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record.context("Failed to read input file")?;
        let Some(key) = record.get(0).filter(|k| !k.is_empty()) else {
            continue;
        };
        let name = record.get(1).filter(|n| !n.is_empty()).unwrap_or(key);
        entries.push(BulkEntry {
            key: key.to_owned(),
            name: name.to_owned(),
        });
    }
    Ok(entries)
}

pub async fn bulk_download(
    api: &HumbleApi,
    downloader: &Downloader,
    input: &Path,
    options: &DownloadArgs,
    root: &Path,
) -> Result<()> {
    let file = std::fs::File::open(input)
        .with_context(|| format!("Failed to open input file {}", input.display()))?;
    let entries = read_bulk_input(file)?;
    info!("Bulk downloading {} bundle(s)", entries.len());

    let mut failures = Vec::new();
    for entry in &entries {
        if let Err(e) = download_bundle(api, downloader, &entry.key, None, options, root).await {
            warn!("Bundle {} failed: {:#}", entry.key, e);
            failures.push((entry, e));
        }
    }

    for (entry, e) in &failures {
        println!("Error handling: {}", entry.name);
        println!("Error: {e:#}");
    }

    if !failures.is_empty() {
        bail!("{} of {} bundle(s) failed", failures.len(), entries.len());
    }
    Ok(())
}
