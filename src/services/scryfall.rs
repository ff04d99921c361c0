//! Scryfall API client
//!
//! Card search and print listing used to pick the face-swap target image.
//!
//! API reference: <https://scryfall.com/docs/api>

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;

use crate::models::card::{CardPrint, ScryfallCard, ScryfallList};

#[derive(Debug, thiserror::Error)]
pub enum ScryfallError {
    #[error("HTTP request to Scryfall failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid Scryfall URL: {0}")]
    InvalidUrl(String),

    #[error("Scryfall returned an unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Scryfall service unavailable: {0}")]
    Unavailable(String),
}

/// Client for the Scryfall card database.
pub struct ScryfallClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ScryfallClient {
    /// Scryfall asks every client to send a descriptive User-Agent and an
    /// explicit Accept header.
    pub fn new(base_url: &str) -> Result<Self, ScryfallError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ScryfallError::InvalidUrl(format!("{base_url}: {e}")))?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .user_agent(concat!("card-faceswap/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(15))
            .build()?;

        Ok(Self { http, base_url })
    }

    /// Search every print matching `query`, newest first.
    ///
    /// A query with no matches is an empty list, not an error.
    pub async fn search_cards(&self, query: &str) -> Result<Vec<ScryfallCard>, ScryfallError> {
        let mut url = self
            .base_url
            .join("cards/search")
            .map_err(|e| ScryfallError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("unique", "prints")
            .append_pair("order", "released");

        match self.fetch_list(url).await? {
            Some(cards) => Ok(cards),
            None => Ok(Vec::new()),
        }
    }

    /// List all printed variants behind a card's `prints_search_uri`,
    /// including non-English prints.
    pub async fn card_prints(&self, prints_search_uri: &str) -> Result<Vec<CardPrint>, ScryfallError> {
        let mut url = Url::parse(prints_search_uri)
            .map_err(|e| ScryfallError::InvalidUrl(format!("{prints_search_uri}: {e}")))?;

        if url.host_str() != self.base_url.host_str() || url.port_or_known_default() != self.base_url.port_or_known_default() {
            return Err(ScryfallError::InvalidUrl(format!(
                "{prints_search_uri} is not a Scryfall API URL"
            )));
        }

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !matches!(k.as_ref(), "unique" | "include_multilingual" | "order"))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair("unique", "prints")
            .append_pair("include_multilingual", "true")
            .append_pair("order", "released");

        self.fetch_list(url).await?.ok_or_else(|| {
            ScryfallError::InvalidResponse("print list has no data".to_string())
        })
    }

    /// `Ok(None)` for 404 (Scryfall's "no cards found") or a body without `data`.
    async fn fetch_list<T: DeserializeOwned>(&self, url: Url) -> Result<Option<Vec<T>>, ScryfallError> {
        tracing::debug!(%url, "Querying Scryfall");
        let response = self.http.get(url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => {
                return Err(ScryfallError::Unavailable(format!(
                    "Scryfall returned HTTP {status}"
                )))
            }
            _ => {}
        }

        let list: ScryfallList<T> = response
            .json()
            .await
            .map_err(|e| ScryfallError::InvalidResponse(e.to_string()))?;
        Ok(list.data)
    }
}
