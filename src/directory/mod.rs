//! Collaborator interfaces owned by the surrounding picture service
//!
//! The edit server only reads through these traits. `InMemoryDirectory`
//! backs them for local runs and tests.

pub mod memory;

use crate::protocol::{PictureId, SpaceId, UserId, UserSummary};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub use memory::InMemoryDirectory;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceKind {
    Private,
    Team,
}

impl SpaceKind {
    pub fn is_collaborative(&self) -> bool {
        matches!(self, Self::Team)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureRecord {
    #[allow(dead_code)]
    pub id: PictureId,
    /// `None` for pictures in the public gallery
    pub space_id: Option<SpaceId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceRecord {
    #[allow(dead_code)]
    pub id: SpaceId,
    pub kind: SpaceKind,
}

/// Resolves a session token to the logged-in user
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Option<UserId>, DirectoryError>;
}

#[async_trait]
pub trait PictureLookup: Send + Sync {
    async fn find_picture(&self, id: PictureId) -> Result<Option<PictureRecord>, DirectoryError>;
}

#[async_trait]
pub trait SpaceLookup: Send + Sync {
    async fn find_space(&self, id: SpaceId) -> Result<Option<SpaceRecord>, DirectoryError>;
}

/// `picture:edit` permission check
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    async fn can_edit(&self, user: UserId, picture: PictureId) -> Result<bool, DirectoryError>;
}

#[async_trait]
pub trait UserView: Send + Sync {
    async fn user_summary(&self, id: UserId) -> Result<Option<UserSummary>, DirectoryError>;
}
