//! Recording server wire types.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/room/:token`, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RoomRequest {
    Start { start: StartRequest },
    Stop { stop: StopRequest },
}

/// Who triggered a start or stop, relayed back to the backend by the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    #[serde(rename = "type")]
    pub actor_type: String,
    pub id: String,
}

impl Actor {
    pub fn new(actor_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            actor_type: actor_type.into(),
            id: id.into(),
        }
    }
}

/// Numeric recording status sent by the backend.
pub const RECORDING_STATUS_AUDIO_AND_VIDEO: i64 = 1;
pub const RECORDING_STATUS_AUDIO_ONLY: i64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    /// User id of the recording owner.
    pub owner: String,

    pub actor: Actor,

    /// Recording status, `1` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
}

impl StartRequest {
    /// Returns the requested mode, or `None` for an unknown status.
    pub fn mode(&self) -> Option<RecordingMode> {
        match self.status {
            None => Some(RecordingMode::default()),
            Some(status) => RecordingMode::from_status(status),
        }
    }
}

/// Actor as sent in a stop request, where both fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopActor {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub actor_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<StopActor>,
}

impl StopRequest {
    /// The stop actor, only when both its type and id were sent.
    pub fn actor(&self) -> Option<Actor> {
        let actor = self.actor.as_ref()?;
        match (&actor.actor_type, &actor.id) {
            (Some(actor_type), Some(id)) => Some(Actor::new(actor_type.clone(), id.clone())),
            _ => None,
        }
    }
}

/// What a recording captures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RecordingMode {
    #[default]
    AudioAndVideo,
    AudioOnly,
}

impl RecordingMode {
    pub fn from_status(status: i64) -> Option<Self> {
        match status {
            RECORDING_STATUS_AUDIO_AND_VIDEO => Some(Self::AudioAndVideo),
            RECORDING_STATUS_AUDIO_ONLY => Some(Self::AudioOnly),
            _ => None,
        }
    }

    pub fn status(self) -> i64 {
        match self {
            Self::AudioAndVideo => RECORDING_STATUS_AUDIO_AND_VIDEO,
            Self::AudioOnly => RECORDING_STATUS_AUDIO_ONLY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AudioAndVideo => "audio_and_video",
            Self::AudioOnly => "audio_only",
        }
    }
}

/// Response body of `GET /api/v1/welcome`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeResponse {
    pub version: String,
}

/// Empty JSON object returned by successful room requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyResponse {}
