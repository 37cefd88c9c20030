use crate::choices::extract_choice_data;
use crate::config::Settings;
use crate::error::ApiError;
use crate::models::{Bundle, BundleMap, ChoicePeriod, GameKey, HumbleChoice};

use futures::future::join_all;
use log::{debug, info};
use reqwest::Client;
use reqwest::header::{ACCEPT, COOKIE};
use serde::de::DeserializeOwned;

const USER_ORDER_PATH: &str = "/api/v1/user/order";
const ORDERS_PATH: &str = "/api/v1/orders";
const ORDER_PATH: &str = "/api/v1/order";
const MEMBERSHIP_PATH: &str = "/membership";

/// Client for the purchase API of one logged in user
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct HumbleApi {
    client: Client,
    base_url: String,
    session_cookie: String,
    batch_size: usize,
}

impl HumbleApi {
    /// Creates a client for one session
    ///
    /// # Arguments
    /// * `session_key` - Value of the `_simpleauth_sess` cookie
    /// * `settings` - Base URL, batch size and API timeout
    pub fn new(session_key: &str, settings: &Settings) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(settings.api_timeout()).build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_owned(),
            session_cookie: format!("_simpleauth_sess={session_key}"),
            batch_size: settings.batch_size.max(1),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let body = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(ACCEPT, "application/json")
            .header(COOKIE, &self.session_cookie)
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetches the identifiers of all bundles owned by the user
    pub async fn list_identifiers(&self) -> Result<Vec<String>, ApiError> {
        let keys: Vec<GameKey> = self.get_json(USER_ORDER_PATH, &[]).await?;
        Ok(keys.into_iter().map(|k| k.gamekey).collect())
    }

    /// Fetches every bundle owned by the user, oldest first
    pub async fn list_bundles(&self) -> Result<Vec<Bundle>, ApiError> {
        let keys = self.list_identifiers().await?;
        self.fetch_all(&keys).await
    }

    /// Fetches the given bundles in concurrent batches
    ///
    /// # Arguments
    /// * `keys` - Bundle identifiers, split into batches of `batch_size`
    ///
    /// # Returns
    /// All bundles sorted by creation time, with ties kept in `keys` order.
    /// Fails with the first failing batch's error if any batch fails.
    pub async fn fetch_all(&self, keys: &[String]) -> Result<Vec<Bundle>, ApiError> {
        let tasks: Vec<_> = keys
            .chunks(self.batch_size)
            .map(|batch| {
                let api = self.clone();
                let batch = batch.to_vec();
                tokio::spawn(async move { api.read_bundles_data(&batch).await })
            })
            .collect();

        info!(
            "Fetching {} bundle(s) in {} batch(es)",
            keys.len(),
            tasks.len()
        );

        let mut bundles = Vec::with_capacity(keys.len());
        for result in join_all(tasks).await {
            bundles.extend(result??);
        }

        bundles.sort_by_key(|b| b.created);
        Ok(bundles)
    }

    /// Fetches one batch of bundles, ordered like `keys`
    async fn read_bundles_data(&self, keys: &[String]) -> Result<Vec<Bundle>, ApiError> {
        let mut query = vec![("all_tpkds", "true")];
        query.extend(keys.iter().map(|key| ("gamekeys", key.as_str())));

        debug!("Requesting batch of {} bundle(s)", keys.len());
        let mut bundle_map: BundleMap = self.get_json(ORDERS_PATH, &query).await?;

        let mut bundles: Vec<Bundle> = keys.iter().filter_map(|k| bundle_map.remove(k)).collect();

        // Entries the server returned without being asked for go last
        let mut extra: Vec<Bundle> = bundle_map.into_values().collect();
        extra.sort_by(|a, b| a.gamekey().cmp(b.gamekey()));
        bundles.extend(extra);

        Ok(bundles)
    }

    /// Fetches a single bundle with all of its keys
    ///
    /// # Arguments
    /// * `key` - Full bundle identifier
    pub async fn fetch_one(&self, key: &str) -> Result<Bundle, ApiError> {
        self.get_json(&format!("{ORDER_PATH}/{key}"), &[("all_tpkds", "true")])
            .await
    }

    /// Reads the choice subscription data of a month from its membership page
    ///
    /// # Returns
    /// The parsed page data, or `BundleNotFound` when the page has none
    pub async fn read_bundle_choices(&self, period: &ChoicePeriod) -> Result<HumbleChoice, ApiError> {
        let html = self
            .client
            .get(format!("{}{}/{}", self.base_url, MEMBERSHIP_PATH, period))
            .header(COOKIE, &self.session_cookie)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let data = extract_choice_data(&html).ok_or(ApiError::BundleNotFound)?;
        Ok(serde_json::from_str(data)?)
    }
}
