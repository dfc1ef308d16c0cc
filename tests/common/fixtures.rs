//! Playlist fixtures served by [`FakeSpotify`].

use super::fake_spotify::FakeSpotify;
use playlist_etl::config::{RetrySettings, SpotifySettings};
use playlist_etl::spotify::HttpResponse;
use playlist_etl::{SqliteRunLog, SqliteWarehouse};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const API_BASE_URL: &str = "http://spotify.test/v1";
pub const TOKEN_URL: &str = "http://spotify.test/api/token";
pub const PLAYLIST_ID: &str = "31FWVQBp3WQydWLNhO0ACi";
pub const PLAYLIST_NAME: &str = "Lofi Favourites";
pub const SNAPSHOT_ID: &str = "snapshot-42";

pub const ALBUM_COUNT: usize = 7;
pub const ARTIST_COUNT: usize = 5;

pub fn spotify_settings(page_limit: u32) -> SpotifySettings {
    SpotifySettings {
        client_id: "test-client".to_string(),
        client_secret: "test-secret".to_string(),
        playlist_id: PLAYLIST_ID.to_string(),
        api_base_url: API_BASE_URL.to_string(),
        token_url: TOKEN_URL.to_string(),
        page_limit,
        request_timeout_secs: 5,
        retry: RetrySettings {
            max_attempts: 3,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 2.0,
        },
    }
}

pub fn playlist_metadata_url() -> String {
    format!("{}/playlists/{}?fields=id,name,snapshot_id", API_BASE_URL, PLAYLIST_ID)
}

pub fn first_page_url(page_limit: u32) -> String {
    format!("{}/playlists/{}/tracks?limit={}", API_BASE_URL, PLAYLIST_ID, page_limit)
}

fn page_url(offset: usize, page_limit: u32) -> String {
    if offset == 0 {
        return first_page_url(page_limit);
    }
    format!(
        "{}/playlists/{}/tracks?offset={}&limit={}",
        API_BASE_URL, PLAYLIST_ID, offset, page_limit
    )
}

pub fn track_id(index: usize) -> String {
    format!("track{:03}", index)
}

fn album_id(index: usize) -> String {
    format!("album{}", index % ALBUM_COUNT)
}

fn artist_ids(index: usize) -> [String; 2] {
    [
        format!("artist{}", index % ARTIST_COUNT),
        format!("artist{}", (index + 1) % ARTIST_COUNT),
    ]
}

fn playlist_item(index: usize) -> Value {
    let [first, second] = artist_ids(index);
    json!({
        "added_at": "2023-10-01T12:00:00Z",
        "track": {
            "id": track_id(index),
            "name": format!("Track {}", index),
            "popularity": (index % 100) as i64,
            "duration_ms": 180_000 + index as i64 * 1_000,
            "album": {
                "id": album_id(index),
                "name": format!("Album {}", index % ALBUM_COUNT),
                "release_date": "2021-06-01",
                "total_tracks": 12
            },
            "artists": [
                { "id": first, "name": "first" },
                { "id": second, "name": "second" }
            ]
        }
    })
}

/// Serve a playlist of `track_count` tracks split into pages of `page_limit`,
/// plus its metadata and every referenced artist.
pub fn serve_playlist(fake: &FakeSpotify, track_count: usize, page_limit: u32) {
    fake.route(
        playlist_metadata_url(),
        HttpResponse::ok(
            json!({ "id": PLAYLIST_ID, "name": PLAYLIST_NAME, "snapshot_id": SNAPSHOT_ID })
                .to_string(),
        ),
    );

    let page_size = page_limit as usize;
    let mut offset = 0;
    loop {
        let end = (offset + page_size).min(track_count);
        let items: Vec<Value> = (offset..end).map(playlist_item).collect();
        let next = if end < track_count {
            Value::String(page_url(end, page_limit))
        } else {
            Value::Null
        };
        fake.route(
            page_url(offset, page_limit),
            HttpResponse::ok(json!({ "items": items, "next": next }).to_string()),
        );
        if end >= track_count {
            break;
        }
        offset = end;
    }

    // Artist ids in first-seen playlist order.
    let mut seen: Vec<String> = Vec::new();
    for index in 0..track_count {
        for id in artist_ids(index) {
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
    }
    for chunk in seen.chunks(50) {
        let artists: Vec<Value> = chunk
            .iter()
            .map(|id| {
                json!({
                    "id": id,
                    "name": format!("Artist {}", id),
                    "genres": ["lo-fi", "chillhop"],
                    "popularity": 60
                })
            })
            .collect();
        fake.route(
            artists_url(chunk),
            HttpResponse::ok(json!({ "artists": artists }).to_string()),
        );
    }
}

pub fn artists_url(ids: &[String]) -> String {
    format!("{}/artists?ids={}", API_BASE_URL, ids.join(","))
}

/// A warehouse and run log in their own temporary directory.
pub struct TestStores {
    pub warehouse: SqliteWarehouse,
    pub run_log: SqliteRunLog,
    pub dir: TempDir,
}

impl TestStores {
    pub fn open() -> Self {
        let dir = TempDir::new().unwrap();
        let warehouse = SqliteWarehouse::open(dir.path().join("warehouse.db")).unwrap();
        let run_log = SqliteRunLog::open(dir.path().join("warehouse.runs.db")).unwrap();
        Self {
            warehouse,
            run_log,
            dir,
        }
    }
}
