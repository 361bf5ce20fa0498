//! Handle for driving a running player.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::messages::PlayerMessage;
use super::snapshot::PlayerSnapshot;
use crate::error::{PlaybackError, Result};
use crate::progress::ProgressSample;

/// Cloneable handle to a [`super::PlayerActor`].
///
/// Requests are queued in the player's mailbox and handled one at a time.
#[derive(Clone)]
pub struct PlayerHandle {
    sender: mpsc::Sender<PlayerMessage>,
    snapshots: watch::Receiver<PlayerSnapshot>,
    cancellation_token: CancellationToken,
}

impl PlayerHandle {
    pub(crate) fn new(
        sender: mpsc::Sender<PlayerMessage>,
        snapshots: watch::Receiver<PlayerSnapshot>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            sender,
            snapshots,
            cancellation_token,
        }
    }

    async fn send(&self, msg: PlayerMessage) -> Result<()> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| PlaybackError::Closed)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> PlayerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| PlaybackError::Closed)
    }

    /// Latest published state.
    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.snapshots.clone()
    }

    /// State as seen by the actor after every queued message has been handled.
    pub async fn current(&self) -> Result<PlayerSnapshot> {
        self.request(PlayerMessage::GetSnapshot).await
    }

    pub async fn request_source_switch(&self, index: usize) -> Result<()> {
        self.request(|reply| PlayerMessage::SwitchSource { index, reply })
            .await?
    }

    pub async fn request_next_episode(&self) -> Result<()> {
        self.send(PlayerMessage::NextEpisode).await
    }

    pub async fn retry(&self) -> Result<()> {
        self.send(PlayerMessage::Retry).await
    }

    pub async fn select_audio_track(&self, id: u32) -> Result<()> {
        self.request(|reply| PlayerMessage::SelectAudioTrack { id, reply })
            .await?
    }

    /// `None` returns to automatic quality.
    pub async fn select_quality(&self, level: Option<usize>) -> Result<()> {
        self.request(|reply| PlayerMessage::SelectQuality { level, reply })
            .await?
    }

    pub async fn request_picture_in_picture(&self, gesture_at: Instant) -> Result<()> {
        self.request(|reply| PlayerMessage::PictureInPicture { gesture_at, reply })
            .await?
    }

    pub async fn request_fullscreen(&self, gesture_at: Instant) -> Result<()> {
        self.request(|reply| PlayerMessage::Fullscreen { gesture_at, reply })
            .await?
    }

    pub async fn user_interaction(&self) -> Result<()> {
        self.send(PlayerMessage::UserInteraction).await
    }

    pub async fn embed_loaded(&self) -> Result<()> {
        self.send(PlayerMessage::EmbedLoaded).await
    }

    pub async fn embed_load_failed(&self, reason: impl Into<String>) -> Result<()> {
        self.send(PlayerMessage::EmbedLoadFailed(reason.into())).await
    }

    pub async fn embed_message(&self, origin: impl Into<String>, payload: Value) -> Result<()> {
        self.send(PlayerMessage::EmbedMessage {
            origin: origin.into(),
            payload,
        })
        .await
    }

    /// Flush the final progress report and stop the player.
    ///
    /// Returns the reported sample. Closing twice fails with [`PlaybackError::Closed`].
    pub async fn close(&self) -> Result<ProgressSample> {
        self.request(PlayerMessage::Close).await
    }

    /// Stop without waiting. The final report is still made.
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
