//! Line-oriented JSON command protocol.
//!
//! Every stdin line is one [`Command`]. The [`Session`] applies it to the
//! marker catalog, forwards whatever the tracker needs to know over the
//! tracker channel, and produces exactly one JSON reply line:
//! `{"ok":true,...}` on success or `{"ok":false,"error":"..."}` on failure.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use waymark_core::TrackerInput;
use waymark_core::tracker::validate_fix;
use waymark_store::{Catalog, Toggle};
use waymark_types::{ImageId, Marker, MarkerId, ObserverFix};

use crate::error::EngineError;

/// A request read from stdin.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum Command {
    /// A new observer position. Stamped with the current time when no
    /// timestamp is given.
    Fix {
        /// Latitude in decimal degrees.
        latitude: f64,
        /// Longitude in decimal degrees.
        longitude: f64,
        /// When the sample was taken.
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    /// Long press: remove the marker at this coordinate or place one.
    Place {
        /// Latitude in decimal degrees.
        latitude: f64,
        /// Longitude in decimal degrees.
        longitude: f64,
    },
    /// Delete a marker and its photos.
    Remove {
        /// Marker to delete.
        id: MarkerId,
    },
    /// Attach a photo to a marker.
    Attach {
        /// Marker to attach to.
        marker_id: MarkerId,
        /// Location of the photo.
        uri: String,
    },
    /// Remove a photo.
    Detach {
        /// Photo to remove.
        image_id: ImageId,
    },
    /// Remove a marker's photo by its location. Replies with a null image
    /// when the marker has no photo at that location.
    DetachUri {
        /// Marker the photo belongs to.
        marker_id: MarkerId,
        /// Location of the photo.
        uri: String,
    },
    /// List a marker's photos.
    Images {
        /// Marker whose photos to list.
        marker_id: MarkerId,
    },
    /// List every marker.
    Markers,
}

/// Command-handling state: the catalog and the way into the tracker.
#[derive(Debug)]
pub struct Session {
    catalog: Catalog,
    tracker: mpsc::Sender<TrackerInput>,
}

impl Session {
    /// Start with an empty catalog.
    pub const fn new(tracker: mpsc::Sender<TrackerInput>) -> Self {
        Self {
            catalog: Catalog::new(),
            tracker,
        }
    }

    /// Parse and execute one input line and return the reply line.
    pub async fn handle_line(&mut self, line: &str) -> String {
        let result = match serde_json::from_str::<Command>(line) {
            Ok(command) => self.execute(command).await,
            Err(e) => Err(EngineError::from(e)),
        };
        match result {
            Ok(body) => ok_reply(body),
            Err(e) => {
                warn!(error = %e, "command failed");
                error_reply(&e)
            }
        }
    }

    /// Execute one command and return the reply body.
    ///
    /// # Errors
    ///
    /// Returns the store or tracker error that made the command fail, or
    /// [`EngineError::TrackerStopped`] if the tracker task has exited.
    pub async fn execute(&mut self, command: Command) -> Result<Value, EngineError> {
        debug!(?command, "executing command");
        match command {
            Command::Fix {
                latitude,
                longitude,
                timestamp,
            } => {
                let fix = ObserverFix::new(latitude, longitude, timestamp.unwrap_or_else(Utc::now));
                validate_fix(&fix)?;
                self.send(TrackerInput::Fix(fix)).await?;
                Ok(json!({ "queued": true }))
            }
            Command::Place {
                latitude,
                longitude,
            } => {
                let toggle = self.catalog.toggle_at(latitude, longitude)?;
                match &toggle {
                    Toggle::Created { .. } => {
                        self.send(TrackerInput::Markers(self.catalog.snapshot()))
                            .await?;
                    }
                    Toggle::Removed { marker, .. } => {
                        self.send(TrackerInput::Retire(marker.id)).await?;
                    }
                }
                Ok(serde_json::to_value(toggle)?)
            }
            Command::Remove { id } => {
                let (marker, images_removed) = self.catalog.delete_marker(id)?;
                self.send(TrackerInput::Retire(id)).await?;
                Ok(json!({ "removed": marker, "images_removed": images_removed }))
            }
            Command::Attach { marker_id, uri } => {
                let image_id = self.catalog.attach_image(marker_id, &uri)?;
                Ok(json!({ "image_id": image_id }))
            }
            Command::Detach { image_id } => {
                let image = self.catalog.detach_image(image_id)?;
                Ok(json!({ "image": image }))
            }
            Command::DetachUri { marker_id, uri } => {
                let image = self.catalog.detach_image_by_uri(marker_id, &uri)?;
                Ok(json!({ "image": image }))
            }
            Command::Images { marker_id } => {
                let images = self.catalog.images_for(marker_id)?;
                Ok(json!({ "images": images }))
            }
            Command::Markers => {
                let markers: Vec<&Marker> = self.catalog.markers().records().collect();
                Ok(json!({ "markers": markers }))
            }
        }
    }

    async fn send(&self, input: TrackerInput) -> Result<(), EngineError> {
        self.tracker
            .send(input)
            .await
            .map_err(|_closed| EngineError::TrackerStopped)
    }
}

fn ok_reply(body: Value) -> String {
    let mut reply = Map::new();
    reply.insert("ok".to_owned(), Value::Bool(true));
    if let Value::Object(fields) = body {
        reply.extend(fields);
    }
    Value::Object(reply).to_string()
}

fn error_reply(error: &EngineError) -> String {
    json!({ "ok": false, "error": error.to_string() }).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session() -> (Session, mpsc::Receiver<TrackerInput>) {
        let (tx, rx) = waymark_core::runner::tracker_channel(16);
        (Session::new(tx), rx)
    }

    fn parse(line: &str) -> Value {
        serde_json::from_str(line).unwrap()
    }

    #[tokio::test]
    async fn place_twice_creates_then_removes() {
        let (mut s, mut rx) = session();

        let first = parse(
            &s.handle_line(r#"{"command":"place","latitude":1.5,"longitude":2.5}"#)
                .await,
        );
        assert_eq!(first["ok"], true);
        assert_eq!(first["outcome"], "created");
        assert_eq!(first["id"], 1);
        assert!(matches!(rx.recv().await, Some(TrackerInput::Markers(m)) if m.len() == 1));

        let second = parse(
            &s.handle_line(r#"{"command":"place","latitude":1.5,"longitude":2.5}"#)
                .await,
        );
        assert_eq!(second["outcome"], "removed");
        assert_eq!(
            rx.recv().await,
            Some(TrackerInput::Retire(MarkerId::new(1)))
        );
    }

    #[tokio::test]
    async fn malformed_line_gets_error_reply() {
        let (mut s, _rx) = session();
        let reply = parse(&s.handle_line("{not json").await);
        assert_eq!(reply["ok"], false);
        assert!(reply["error"].as_str().unwrap().starts_with("malformed command"));

        let unknown = parse(&s.handle_line(r#"{"command":"teleport"}"#).await);
        assert_eq!(unknown["ok"], false);
    }

    #[tokio::test]
    async fn invalid_fix_is_refused_before_queueing() {
        let (mut s, mut rx) = session();
        let reply = parse(
            &s.handle_line(r#"{"command":"fix","latitude":120.0,"longitude":0.0}"#)
                .await,
        );
        assert_eq!(reply["ok"], false);
        assert!(rx.try_recv().is_err());

        let ok = parse(
            &s.handle_line(
                r#"{"command":"fix","latitude":10.0,"longitude":0.0,"timestamp":"2024-05-01T12:00:00Z"}"#,
            )
            .await,
        );
        assert_eq!(ok["queued"], true);
        assert!(matches!(
            rx.recv().await,
            Some(TrackerInput::Fix(fix)) if fix.timestamp.to_rfc3339() == "2024-05-01T12:00:00+00:00"
        ));
    }

    #[tokio::test]
    async fn photos_follow_their_marker() {
        let (mut s, _rx) = session();
        s.handle_line(r#"{"command":"place","latitude":3.0,"longitude":4.0}"#)
            .await;
        let attach = parse(
            &s.handle_line(r#"{"command":"attach","marker_id":1,"uri":"file:///p.jpg"}"#)
                .await,
        );
        assert_eq!(attach["image_id"], 1);

        let images = parse(&s.handle_line(r#"{"command":"images","marker_id":1}"#).await);
        assert_eq!(images["images"].as_array().unwrap().len(), 1);

        let removed = parse(&s.handle_line(r#"{"command":"remove","id":1}"#).await);
        assert_eq!(removed["images_removed"], 1);

        let gone = parse(&s.handle_line(r#"{"command":"images","marker_id":1}"#).await);
        assert_eq!(gone["error"], "marker not found: 1");
    }

    #[tokio::test]
    async fn closed_tracker_is_reported() {
        let (mut s, rx) = session();
        drop(rx);
        let reply = parse(
            &s.handle_line(r#"{"command":"fix","latitude":1.0,"longitude":1.0}"#)
                .await,
        );
        assert_eq!(reply["error"], "tracker stopped");
    }

    #[tokio::test]
    async fn markers_lists_full_records() {
        let (mut s, _rx) = session();
        s.handle_line(r#"{"command":"place","latitude":3.0,"longitude":4.0}"#)
            .await;
        let reply = parse(&s.handle_line(r#"{"command":"markers"}"#).await);
        let markers = reply["markers"].as_array().unwrap();
        assert_eq!(markers.len(), 1);
        assert!(markers.first().and_then(|m| m.get("created_at")).is_some());
    }

    #[tokio::test]
    async fn detach_uri_removes_only_the_matching_photo() {
        let (mut s, _rx) = session();
        s.handle_line(r#"{"command":"place","latitude":3.0,"longitude":4.0}"#)
            .await;
        s.handle_line(r#"{"command":"attach","marker_id":1,"uri":"file:///a.jpg"}"#)
            .await;
        s.handle_line(r#"{"command":"attach","marker_id":1,"uri":"file:///b.jpg"}"#)
            .await;

        let detached = parse(
            &s.handle_line(r#"{"command":"detach_uri","marker_id":1,"uri":"file:///a.jpg"}"#)
                .await,
        );
        assert_eq!(detached["ok"], true);
        assert_eq!(detached["image"]["uri"], "file:///a.jpg");

        let missing = parse(
            &s.handle_line(r#"{"command":"detach_uri","marker_id":1,"uri":"file:///a.jpg"}"#)
                .await,
        );
        assert_eq!(missing["ok"], true);
        assert!(missing["image"].is_null());

        let images = parse(&s.handle_line(r#"{"command":"images","marker_id":1}"#).await);
        let left = images["images"].as_array().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left.first().and_then(|i| i.get("uri")).unwrap(), "file:///b.jpg");

        let unknown = parse(
            &s.handle_line(r#"{"command":"detach_uri","marker_id":9,"uri":"file:///a.jpg"}"#)
                .await,
        );
        assert_eq!(unknown["error"], "marker not found: 9");
    }
}
