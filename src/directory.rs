//! Room and video metadata.
//!
//! Two read paths and one write path live outside the room connection:
//!
//! - the room listing, served by the room server at `GET /rooms`
//! - a room's playlist, served by the video service at `GET /api/videos/?room=`
//! - adding a video, `POST /api/videos/add/`
//!
//! [`Directory`] abstracts them so the session can be driven against a fake.
//! [`RoomPoller`] refreshes the room listing on a timer for a room picker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::handshake::RoomName;
use crate::protocol::{RoomSummary, Video};

/// Default refresh period of [`RoomPoller`].
pub const DEFAULT_ROOM_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Read and write access to room and video metadata.
///
/// Failures are reported as
/// [`WatchPartyError::MetadataFetchFailed`](crate::WatchPartyError::MetadataFetchFailed)
/// and are never fatal to a session.
#[async_trait]
pub trait Directory: Send + Sync + 'static {
    /// Active rooms and their occupancy.
    async fn list_rooms(&self) -> Result<Vec<RoomSummary>>;

    /// The room's playlist, in display order.
    async fn list_videos(&self, room: &RoomName) -> Result<Vec<Video>>;

    /// Add a video to the room's playlist.
    async fn add_video(&self, room: &RoomName, video_url: &str) -> Result<()>;
}

// ── HTTP implementation ─────────────────────────────────────────────

#[cfg(feature = "http-directory")]
pub use http::HttpDirectory;

#[cfg(feature = "http-directory")]
mod http {
    use async_trait::async_trait;
    use serde::Serialize;
    use tracing::debug;
    use url::Url;

    use super::Directory;
    use crate::error::{Result, WatchPartyError};
    use crate::handshake::{append_path, Endpoints, RoomName};
    use crate::protocol::{RoomSummary, Video};

    const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

    #[derive(Serialize)]
    struct AddVideoRequest<'a> {
        url: &'a str,
        room: &'a str,
    }

    /// [`Directory`] backed by the room server and the video service over HTTP.
    #[derive(Debug, Clone)]
    pub struct HttpDirectory {
        client: reqwest::Client,
        rooms_url: Url,
        videos_url: Url,
        add_video_url: Url,
    }

    impl HttpDirectory {
        /// Build a directory client for `endpoints`.
        ///
        /// # Errors
        ///
        /// Returns [`WatchPartyError::InvalidUrl`] if either base URL does not
        /// parse, or [`WatchPartyError::MetadataFetchFailed`] if the HTTP
        /// client cannot be built.
        pub fn new(endpoints: &Endpoints) -> Result<Self> {
            let client = reqwest::Client::builder()
                .user_agent(concat!("watchparty-client/", env!("CARGO_PKG_VERSION")))
                .timeout(REQUEST_TIMEOUT)
                .build()
                .map_err(fetch_failed)?;
            Self::with_client(client, endpoints)
        }

        /// Build a directory client around an existing [`reqwest::Client`].
        ///
        /// # Errors
        ///
        /// Returns [`WatchPartyError::InvalidUrl`] if either base URL does not
        /// parse.
        pub fn with_client(client: reqwest::Client, endpoints: &Endpoints) -> Result<Self> {
            let api = Url::parse(&endpoints.api_base)?;
            Ok(Self {
                client,
                rooms_url: append_path(endpoints.room_server_http()?, &["rooms"])?,
                videos_url: append_path(api.clone(), &["api", "videos", ""])?,
                add_video_url: append_path(api, &["api", "videos", "add", ""])?,
            })
        }

        async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
            debug!(%url, "directory GET");
            let response = self.client.get(url).send().await.map_err(fetch_failed)?;
            if !response.status().is_success() {
                return Err(WatchPartyError::MetadataFetchFailed(format!(
                    "directory returned status {}",
                    response.status()
                )));
            }
            response.json().await.map_err(fetch_failed)
        }
    }

    #[async_trait]
    impl Directory for HttpDirectory {
        async fn list_rooms(&self) -> Result<Vec<RoomSummary>> {
            self.get_json(self.rooms_url.clone()).await
        }

        async fn list_videos(&self, room: &RoomName) -> Result<Vec<Video>> {
            let mut url = self.videos_url.clone();
            url.query_pairs_mut().append_pair("room", room.as_str());
            self.get_json(url).await
        }

        async fn add_video(&self, room: &RoomName, video_url: &str) -> Result<()> {
            debug!(room = %room, video_url, "directory POST add video");
            let response = self
                .client
                .post(self.add_video_url.clone())
                .json(&AddVideoRequest {
                    url: video_url,
                    room: room.as_str(),
                })
                .send()
                .await
                .map_err(fetch_failed)?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(WatchPartyError::MetadataFetchFailed(format!(
                    "add video returned status {}",
                    response.status()
                )))
            }
        }
    }

    fn fetch_failed(err: reqwest::Error) -> WatchPartyError {
        WatchPartyError::MetadataFetchFailed(err.to_string())
    }

    #[cfg(test)]
    #[allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing
    )]
    mod tests {
        use super::*;

        #[test]
        fn urls_follow_deployment_layout() {
            let endpoints = Endpoints::new("wss://party.example.com", "https://api.example.com");
            let directory = HttpDirectory::new(&endpoints).unwrap();
            assert_eq!(directory.rooms_url.as_str(), "https://party.example.com/rooms");
            assert_eq!(
                directory.videos_url.as_str(),
                "https://api.example.com/api/videos/"
            );
            assert_eq!(
                directory.add_video_url.as_str(),
                "https://api.example.com/api/videos/add/"
            );
        }

        #[test]
        fn urls_keep_path_prefixes() {
            let endpoints = Endpoints::new(
                "wss://example.com/party",
                "https://example.com/media/",
            );
            let directory = HttpDirectory::new(&endpoints).unwrap();
            assert_eq!(directory.rooms_url.as_str(), "https://example.com/party/rooms");
            assert_eq!(
                directory.videos_url.as_str(),
                "https://example.com/media/api/videos/"
            );
            assert_eq!(
                directory.add_video_url.as_str(),
                "https://example.com/media/api/videos/add/"
            );
        }

        #[test]
        fn bad_base_url_is_rejected() {
            let endpoints = Endpoints::new("not a url", "http://localhost:8000");
            assert!(matches!(
                HttpDirectory::new(&endpoints),
                Err(WatchPartyError::InvalidUrl(_))
            ));
        }
    }
}

// ── Room poller ─────────────────────────────────────────────────────

/// Periodically refreshes the room listing.
///
/// The latest successful result is published on a [`watch`] channel. A failed
/// poll is logged and leaves the previous list in place. The background task
/// stops when the poller is dropped.
#[derive(Debug)]
pub struct RoomPoller {
    rooms: watch::Receiver<Vec<RoomSummary>>,
    task: JoinHandle<()>,
}

impl RoomPoller {
    /// Start polling `directory` every `interval`, beginning immediately.
    pub fn start(directory: Arc<dyn Directory>, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(Vec::new());
        let task = tokio::spawn(poll_loop(directory, interval, tx));
        Self { rooms: rx, task }
    }

    /// The most recently fetched room list.
    pub fn rooms(&self) -> Vec<RoomSummary> {
        self.rooms.borrow().clone()
    }

    /// A receiver that is notified whenever the list is refreshed.
    pub fn subscribe(&self) -> watch::Receiver<Vec<RoomSummary>> {
        self.rooms.clone()
    }
}

impl Drop for RoomPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_loop(
    directory: Arc<dyn Directory>,
    interval: Duration,
    tx: watch::Sender<Vec<RoomSummary>>,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match directory.list_rooms().await {
            Ok(rooms) => {
                debug!(count = rooms.len(), "room list refreshed");
                if tx.send(rooms).is_err() {
                    debug!("room list receivers gone, stopping poller");
                    break;
                }
            }
            Err(e) => warn!("room list refresh failed: {e}"),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::WatchPartyError;
    use std::sync::Mutex as StdMutex;

    /// Replays scripted room listings; an exhausted script repeats the last entry.
    struct ScriptedRooms {
        script: StdMutex<Vec<Result<Vec<RoomSummary>>>>,
    }

    #[async_trait]
    impl Directory for ScriptedRooms {
        async fn list_rooms(&self) -> Result<Vec<RoomSummary>> {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                match script.first() {
                    Some(Ok(rooms)) => Ok(rooms.clone()),
                    _ => Err(WatchPartyError::MetadataFetchFailed("offline".into())),
                }
            }
        }

        async fn list_videos(&self, _room: &RoomName) -> Result<Vec<Video>> {
            Ok(Vec::new())
        }

        async fn add_video(&self, _room: &RoomName, _video_url: &str) -> Result<()> {
            Ok(())
        }
    }

    fn summary(name: &str, count: u32) -> RoomSummary {
        RoomSummary {
            name: name.into(),
            count,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_keeps_previous_list() {
        let directory = Arc::new(ScriptedRooms {
            script: StdMutex::new(vec![
                Ok(vec![summary("general", 2)]),
                Err(WatchPartyError::MetadataFetchFailed("boom".into())),
                Ok(vec![summary("general", 3), summary("films", 1)]),
            ]),
        });
        let poller = RoomPoller::start(directory, Duration::from_secs(5));
        let mut updates = poller.subscribe();

        updates.changed().await.unwrap();
        assert_eq!(poller.rooms(), vec![summary("general", 2)]);

        // The failing tick publishes nothing; the next success does.
        updates.changed().await.unwrap();
        assert_eq!(poller.rooms().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_polling() {
        let directory = Arc::new(ScriptedRooms {
            script: StdMutex::new(vec![Ok(vec![summary("general", 1)])]),
        });
        let poller = RoomPoller::start(directory, Duration::from_secs(5));
        let mut updates = poller.subscribe();
        updates.changed().await.unwrap();

        drop(poller);

        // Sender side is dropped with the aborted task.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(updates.changed().await.is_err());
    }
}
