//! Client-server message protocol

use super::ids::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Message `type` field, shared by both directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Info,
    EnterEdit,
    EditAction,
    ExitEdit,
}

/// Edit operations the owner can relay to the rest of the room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditAction {
    ZoomIn,
    ZoomOut,
    RotateLeft,
    RotateRight,
    Undo,
    Redo,
}

impl EditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZoomIn => "ZOOM_IN",
            Self::ZoomOut => "ZOOM_OUT",
            Self::RotateLeft => "ROTATE_LEFT",
            Self::RotateRight => "ROTATE_RIGHT",
            Self::Undo => "UNDO",
            Self::Redo => "REDO",
        }
    }

    /// Human-readable text used in broadcast messages
    pub fn label(&self) -> &'static str {
        match self {
            Self::ZoomIn => "zoom in",
            Self::ZoomOut => "zoom out",
            Self::RotateLeft => "rotate left",
            Self::RotateRight => "rotate right",
            Self::Undo => "undo",
            Self::Redo => "redo",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown edit action: {0:?}")]
pub struct UnknownEditAction(pub String);

impl FromStr for EditAction {
    type Err = UnknownEditAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ZOOM_IN" => Ok(Self::ZoomIn),
            "ZOOM_OUT" => Ok(Self::ZoomOut),
            "ROTATE_LEFT" => Ok(Self::RotateLeft),
            "ROTATE_RIGHT" => Ok(Self::RotateRight),
            "UNDO" => Ok(Self::Undo),
            "REDO" => Ok(Self::Redo),
            _ => Err(UnknownEditAction(s.to_string())),
        }
    }
}

impl fmt::Display for EditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public view of a user, embedded in every outbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Inbound `type` tag; anything that is not a known type is kept verbatim for the log
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FrameKind {
    Known(MessageType),
    Other(String),
}

/// Raw inbound frame before the `type` tag is resolved
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: FrameKind,
    #[serde(default)]
    edit_action: Option<String>,
}

/// Client → server request
///
/// The edit action stays an opaque string here; the lock coordinator decides
/// whether it names a known action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    EnterEdit,
    EditAction(String),
    ExitEdit,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported message type: {0:?}")]
    UnsupportedType(String),
    #[error("EDIT_ACTION frame without editAction")]
    MissingEditAction,
}

impl ClientRequest {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let frame: InboundFrame = serde_json::from_str(text)?;
        match frame.kind {
            FrameKind::Known(MessageType::EnterEdit) => Ok(Self::EnterEdit),
            FrameKind::Known(MessageType::ExitEdit) => Ok(Self::ExitEdit),
            FrameKind::Known(MessageType::EditAction) => frame
                .edit_action
                .map(Self::EditAction)
                .ok_or(ProtocolError::MissingEditAction),
            // Server-only notice
            FrameKind::Known(MessageType::Info) => {
                Err(ProtocolError::UnsupportedType("INFO".to_string()))
            }
            FrameKind::Other(kind) => Err(ProtocolError::UnsupportedType(kind)),
        }
    }
}

/// Server → client message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_action: Option<EditAction>,
    pub user: UserSummary,
}

impl OutboundMessage {
    fn new(kind: MessageType, message: String, user: &UserSummary) -> Self {
        Self {
            kind,
            message,
            edit_action: None,
            user: user.clone(),
        }
    }

    pub fn joined(user: &UserSummary) -> Self {
        Self::new(MessageType::Info, format!("{} joined editing", user.name), user)
    }

    pub fn left(user: &UserSummary) -> Self {
        Self::new(MessageType::Info, format!("{} left editing", user.name), user)
    }

    pub fn enter_edit(user: &UserSummary) -> Self {
        Self::new(
            MessageType::EnterEdit,
            format!("{} started editing the picture", user.name),
            user,
        )
    }

    pub fn edit_action(user: &UserSummary, action: EditAction) -> Self {
        Self {
            edit_action: Some(action),
            ..Self::new(
                MessageType::EditAction,
                format!("{} performed {}", user.name, action.label()),
                user,
            )
        }
    }

    pub fn exit_edit(user: &UserSummary) -> Self {
        Self::new(
            MessageType::ExitEdit,
            format!("{} stopped editing the picture", user.name),
            user,
        )
    }
}
