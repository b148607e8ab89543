//! Screenshot Uploads
//!
//! Clients upload screenshots as `data:image/<png|jpeg>;base64,...` URLs. The
//! payload is decoded synchronously (cheap, and bad uploads are rejected
//! before anything is spawned) and written to disk on a background task so the
//! simulation never waits on the filesystem.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::game::state::PlayerId;
use crate::network::protocol::ServerMessage;
use crate::network::session::Outbound;

/// Largest decoded image accepted.
pub const MAX_SNAPSHOT_BYTES: usize = 8 * 1024 * 1024;

/// Snapshot errors.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("not an image data URL")]
    NotDataUrl,

    #[error("unsupported image type {0}")]
    UnsupportedType(String),

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("image too large: {0} bytes")]
    TooLarge(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Accepted image encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

/// A decoded upload.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotImage {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

/// Decode a `data:image/...;base64,` URL.
pub fn parse_data_url(url: &str) -> Result<SnapshotImage, SnapshotError> {
    let rest = url.strip_prefix("data:image/").ok_or(SnapshotError::NotDataUrl)?;
    let (mime, payload) = rest.split_once(";base64,").ok_or(SnapshotError::NotDataUrl)?;
    let format = match mime {
        "png" => ImageFormat::Png,
        "jpeg" => ImageFormat::Jpeg,
        other => return Err(SnapshotError::UnsupportedType(other.to_string())),
    };
    if payload.is_empty() {
        return Err(SnapshotError::NotDataUrl);
    }
    // Base64 expands by 4/3; reject oversized payloads before decoding
    if payload.len() / 4 * 3 > MAX_SNAPSHOT_BYTES {
        return Err(SnapshotError::TooLarge(payload.len() / 4 * 3));
    }

    let bytes = STANDARD.decode(payload.trim_end())?;
    Ok(SnapshotImage { format, bytes })
}

/// File name for an upload by `player` at unix-ms `now`.
pub fn file_name(now: u64, player: PlayerId, format: ImageFormat) -> String {
    format!("snap-{}-{}.{}", now, player, format.extension())
}

/// Writes uploads under one directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `image` and return the file name.
    pub async fn write(&self, image: &SnapshotImage, player: PlayerId, now: u64) -> Result<String, SnapshotError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = file_name(now, player, image.format);
        tokio::fs::write(self.dir.join(&name), &image.bytes).await?;
        Ok(name)
    }

    /// Write in the background and answer the uploader with `snapSaved`.
    pub fn save(&self, image: SnapshotImage, player: PlayerId, now: u64, reply: mpsc::Sender<Outbound>) {
        let store = self.clone();
        tokio::spawn(async move {
            match store.write(&image, player, now).await {
                Ok(file) => {
                    info!(player = %player, file = %file, bytes = image.bytes.len(), "snapshot saved");
                    let msg = ServerMessage::SnapSaved { file };
                    if reply.send(Outbound::Message(msg)).await.is_err() {
                        debug!(player = %player, "uploader gone before snapshot ack");
                    }
                }
                Err(e) => warn!(player = %player, error = %e, "snapshot write failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_png_and_jpeg() {
        let png = parse_data_url("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(png.format, ImageFormat::Png);
        assert_eq!(png.bytes, b"hello");

        let jpeg = parse_data_url("data:image/jpeg;base64,aGk=").unwrap();
        assert_eq!(jpeg.format, ImageFormat::Jpeg);
        assert_eq!(jpeg.format.extension(), "jpg");
    }

    #[test]
    fn test_reject_bad_urls() {
        assert!(matches!(parse_data_url("hello"), Err(SnapshotError::NotDataUrl)));
        assert!(matches!(parse_data_url("data:image/png,aGk="), Err(SnapshotError::NotDataUrl)));
        assert!(matches!(parse_data_url("data:image/png;base64,"), Err(SnapshotError::NotDataUrl)));
        assert!(matches!(
            parse_data_url("data:image/gif;base64,aGk="),
            Err(SnapshotError::UnsupportedType(t)) if t == "gif"
        ));
        assert!(matches!(parse_data_url("data:image/png;base64,@@@"), Err(SnapshotError::Base64(_))));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name(1_700_000_000_123, PlayerId(4), ImageFormat::Jpeg), "snap-1700000000123-4.jpg");
    }

    #[tokio::test]
    async fn test_save_writes_file_and_acks() {
        let dir = std::env::temp_dir().join(format!("hunter-boyz-snaps-{}", uuid::Uuid::new_v4()));
        let store = SnapshotStore::new(&dir);
        let (tx, mut rx) = mpsc::channel(4);

        let image = parse_data_url("data:image/png;base64,aGVsbG8=").unwrap();
        store.save(image, PlayerId(2), 55, tx);

        let Some(Outbound::Message(ServerMessage::SnapSaved { file })) = rx.recv().await else {
            panic!("expected snapSaved");
        };
        assert_eq!(file, "snap-55-2.png");
        assert_eq!(tokio::fs::read(dir.join(&file)).await.unwrap(), b"hello");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
