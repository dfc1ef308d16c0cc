//! Spotify Web API client: authentication, retries and cursor pagination.

use super::auth::AccessTokenClient;
use super::error::ExtractError;
use super::models::{RawRecord, RecordShape};
use super::retry_policy::RetryPolicy;
use super::transport::{HttpResponse, HttpTransport};
use super::Extractor;
use crate::config::SpotifySettings;
use crate::resource::Resource;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// The several-artists endpoint accepts at most this many ids per call.
const ARTISTS_PER_REQUEST: usize = 50;

#[derive(Clone, Copy)]
enum Request<'a> {
    Get { url: &'a str },
    Token,
}

pub struct SpotifyClient {
    transport: Box<dyn HttpTransport>,
    credentials: AccessTokenClient,
    retry_policy: RetryPolicy,
    api_base_url: String,
    playlist_id: String,
    page_limit: u32,
    access_token: Mutex<Option<String>>,
    /// Playlist items as first read by this client, shared by every resource.
    playlist_items: Mutex<Option<Vec<Value>>>,
}

impl SpotifyClient {
    pub fn new(settings: &SpotifySettings, transport: Box<dyn HttpTransport>) -> Self {
        Self {
            transport,
            credentials: AccessTokenClient::new(
                &settings.client_id,
                &settings.client_secret,
                &settings.token_url,
            ),
            retry_policy: RetryPolicy::new(&settings.retry),
            api_base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            playlist_id: settings.playlist_id.clone(),
            page_limit: settings.page_limit,
            access_token: Mutex::new(None),
            playlist_items: Mutex::new(None),
        }
    }

    /// Send a request, retrying transient failures with backoff.
    ///
    /// 401/403 are returned as [`ExtractError::Authentication`] without retry.
    /// The one exception is a 401 on a token cached from an earlier request:
    /// the token may have expired, so it is requested again once.
    fn send(&self, request: Request<'_>) -> Result<HttpResponse, ExtractError> {
        let url = match request {
            Request::Get { url } => url,
            Request::Token => self.credentials.token_url(),
        };
        let mut attempts = 0;
        let mut token_refreshed = false;
        loop {
            attempts += 1;
            let mut cached_token = None;
            let result = match request {
                Request::Get { url } => {
                    let (token, fresh) = self.access_token()?;
                    let result = self.transport.get(url, &token);
                    if !fresh {
                        cached_token = Some(token);
                    }
                    result
                }
                Request::Token => self.transport.post_form(
                    url,
                    &self.credentials.basic_credentials(),
                    AccessTokenClient::GRANT_FORM,
                ),
            };

            let (failure, retry_after_secs) = match result {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) if response.status == 401 && !token_refreshed => match cached_token {
                    Some(stale) => {
                        info!("Cached access token rejected by {}, requesting a new one", url);
                        self.forget_token(&stale);
                        token_refreshed = true;
                        attempts -= 1;
                        continue;
                    }
                    None => {
                        return Err(ExtractError::Authentication(format!(
                            "status {} from {}",
                            response.status, url
                        )))
                    }
                },
                Ok(response) if matches!(response.status, 401 | 403) => {
                    return Err(ExtractError::Authentication(format!(
                        "status {} from {}",
                        response.status, url
                    )));
                }
                Ok(response) if response.status == 429 || response.status >= 500 => (
                    format!("status {} from {}", response.status, url),
                    response.retry_after_secs,
                ),
                Ok(response) if matches!(request, Request::Token) => {
                    // Bad credentials come back as 400 invalid_client.
                    return Err(ExtractError::Authentication(format!(
                        "token request rejected with status {}: {}",
                        response.status, response.body
                    )));
                }
                Ok(response) => {
                    return Err(ExtractError::UnexpectedStatus {
                        status: response.status,
                        url: url.to_string(),
                    });
                }
                Err(e) => (format!("{} ({})", e, url), None),
            };

            if !self.retry_policy.should_retry(attempts) {
                return Err(ExtractError::TransientNetwork {
                    attempts,
                    message: failure,
                });
            }
            let delay = self.retry_policy.delay(attempts - 1, retry_after_secs);
            warn!(
                "Transient failure (attempt {}/{}): {}; retrying in {:?}",
                attempts, self.retry_policy.max_attempts, failure, delay
            );
            std::thread::sleep(delay);
        }
    }

    /// Bearer token, requested on first use and cached afterwards. The flag
    /// is true when the token was just issued.
    fn access_token(&self) -> Result<(String, bool), ExtractError> {
        let mut cached = self.access_token.lock().unwrap();
        if let Some(token) = cached.as_ref() {
            return Ok((token.clone(), false));
        }
        debug!("Requesting access token from {}", self.credentials.token_url());
        let response = self.send(Request::Token)?;
        let token = self.credentials.parse_token(&response.body)?;
        *cached = Some(token.clone());
        Ok((token, true))
    }

    fn forget_token(&self, stale: &str) {
        let mut cached = self.access_token.lock().unwrap();
        if cached.as_deref() == Some(stale) {
            *cached = None;
        }
    }

    fn get_json(&self, url: &str) -> Result<Value, ExtractError> {
        let response = self.send(Request::Get { url })?;
        serde_json::from_str(&response.body).map_err(|source| ExtractError::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// Follow `next` pointers from `first_url` until exhausted and return all items.
    pub fn paginate(&self, first_url: &str) -> Result<Vec<Value>, ExtractError> {
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut next_url = Some(first_url.to_string());

        while let Some(url) = next_url {
            if !visited.insert(url.clone()) {
                return Err(ExtractError::PartialPage {
                    url,
                    reason: "next pointer revisits an already fetched page".to_string(),
                });
            }

            let page = self.get_json(&url)?;
            let page_items = page
                .get("items")
                .and_then(Value::as_array)
                .ok_or_else(|| ExtractError::PartialPage {
                    url: url.clone(),
                    reason: "missing 'items' array".to_string(),
                })?;
            next_url = match page.get("next") {
                Some(Value::Null) => None,
                Some(Value::String(next)) => Some(next.clone()),
                Some(_) => {
                    return Err(ExtractError::PartialPage {
                        url,
                        reason: "'next' is neither a string nor null".to_string(),
                    })
                }
                None => {
                    return Err(ExtractError::PartialPage {
                        url,
                        reason: "missing 'next' pointer".to_string(),
                    })
                }
            };

            debug!("Fetched page with {} items from {}", page_items.len(), url);
            items.extend(page_items.iter().cloned());
        }

        Ok(items)
    }

    fn playlist_metadata(&self) -> Result<Value, ExtractError> {
        let url = format!(
            "{}/playlists/{}?fields=id,name,snapshot_id",
            self.api_base_url,
            urlencoding::encode(&self.playlist_id)
        );
        let body = self.get_json(&url)?;
        if body.get("id").and_then(Value::as_str).is_none() {
            return Err(ExtractError::PartialPage {
                url,
                reason: "playlist metadata has no 'id'".to_string(),
            });
        }
        Ok(body)
    }

    /// Playlist items that reference a catalog track.
    ///
    /// The playlist is paginated once per client, so every resource of an
    /// invocation is extracted from the same items. Items whose track is null
    /// or has no id (removed or local-only tracks) are skipped.
    fn playlist_items(&self) -> Result<Vec<Value>, ExtractError> {
        let mut cached = self.playlist_items.lock().unwrap();
        if let Some(items) = cached.as_ref() {
            debug!("Reusing {} playlist items read earlier", items.len());
            return Ok(items.clone());
        }
        let items = self.read_playlist_items()?;
        *cached = Some(items.clone());
        Ok(items)
    }

    fn read_playlist_items(&self) -> Result<Vec<Value>, ExtractError> {
        let url = format!(
            "{}/playlists/{}/tracks?limit={}",
            self.api_base_url,
            urlencoding::encode(&self.playlist_id),
            self.page_limit
        );
        let items = self.paginate(&url)?;
        let total = items.len();
        let items: Vec<Value> = items
            .into_iter()
            .filter(|item| {
                item.get("track")
                    .and_then(|t| t.get("id"))
                    .is_some_and(Value::is_string)
            })
            .collect();
        if items.len() < total {
            warn!(
                "Skipped {} playlist items without a catalog track",
                total - items.len()
            );
        }
        Ok(items)
    }

    fn extract_tracks(&self) -> Result<Vec<RawRecord>, ExtractError> {
        let playlist = self.playlist_metadata()?;
        let items = self.playlist_items()?;
        Ok(items
            .into_iter()
            .map(|mut item| {
                if let Value::Object(fields) = &mut item {
                    fields.insert("playlist".to_string(), playlist.clone());
                }
                RawRecord::new(RecordShape::Track, item)
            })
            .collect())
    }

    fn extract_albums(&self) -> Result<Vec<RawRecord>, ExtractError> {
        let mut seen = HashSet::new();
        let mut albums = Vec::new();
        for item in self.playlist_items()? {
            let Some(album) = item.get("track").and_then(|t| t.get("album")) else {
                continue;
            };
            match album.get("id").and_then(Value::as_str) {
                Some(id) if !seen.insert(id.to_string()) => continue,
                // Keyless albums are passed through so normalization rejects them.
                _ => albums.push(RawRecord::new(RecordShape::Album, album.clone())),
            }
        }
        Ok(albums)
    }

    fn extract_artists(&self) -> Result<Vec<RawRecord>, ExtractError> {
        let mut seen = HashSet::new();
        let mut artist_ids = Vec::new();
        for item in self.playlist_items()? {
            let artists = item
                .get("track")
                .and_then(|t| t.get("artists"))
                .and_then(Value::as_array);
            for artist in artists.into_iter().flatten() {
                if let Some(id) = artist.get("id").and_then(Value::as_str) {
                    if seen.insert(id.to_string()) {
                        artist_ids.push(id.to_string());
                    }
                }
            }
        }

        let mut records = Vec::with_capacity(artist_ids.len());
        for chunk in artist_ids.chunks(ARTISTS_PER_REQUEST) {
            let ids = chunk
                .iter()
                .map(|id| urlencoding::encode(id).into_owned())
                .collect::<Vec<_>>()
                .join(",");
            let url = format!("{}/artists?ids={}", self.api_base_url, ids);
            let body = self.get_json(&url)?;
            let artists = body
                .get("artists")
                .and_then(Value::as_array)
                .ok_or_else(|| ExtractError::PartialPage {
                    url: url.clone(),
                    reason: "missing 'artists' array".to_string(),
                })?;
            if artists.len() != chunk.len() {
                return Err(ExtractError::PartialPage {
                    url,
                    reason: format!(
                        "requested {} artists, received {}",
                        chunk.len(),
                        artists.len()
                    ),
                });
            }
            for (id, artist) in chunk.iter().zip(artists) {
                if artist.is_null() {
                    warn!("Artist {} is unknown upstream, skipping", id);
                    continue;
                }
                records.push(RawRecord::new(RecordShape::Artist, artist.clone()));
            }
        }
        Ok(records)
    }
}

impl Extractor for SpotifyClient {
    fn extract(&self, resource: Resource) -> Result<Vec<RawRecord>, ExtractError> {
        let records = match resource {
            Resource::Tracks => self.extract_tracks()?,
            Resource::Albums => self.extract_albums()?,
            Resource::Artists => self.extract_artists()?,
        };
        info!("Extracted {} raw {} records", records.len(), resource);
        Ok(records)
    }
}
