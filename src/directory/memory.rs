//! In-process directory seeded from a JSON file

use super::{
    AuthorizationProvider, Authenticator, DirectoryError, PictureLookup, PictureRecord,
    SpaceKind, SpaceLookup, SpaceRecord, UserView,
};
use crate::protocol::{PictureId, SpaceId, UserId, UserSummary};
use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Member role inside a team space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceRole {
    Viewer,
    Editor,
    Admin,
}

impl SpaceRole {
    pub fn can_edit(&self) -> bool {
        matches!(self, Self::Editor | Self::Admin)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSeed {
    pub id: UserId,
    pub name: String,
    pub token: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSeed {
    pub user_id: UserId,
    pub role: SpaceRole,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceSeed {
    pub id: SpaceId,
    pub kind: SpaceKind,
    #[serde(default)]
    pub members: Vec<MemberSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PictureSeed {
    pub id: PictureId,
    #[serde(default)]
    pub space_id: Option<SpaceId>,
}

/// Contents of `DIRECTORY_FILE`
#[derive(Debug, Default, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub users: Vec<UserSeed>,
    #[serde(default)]
    pub spaces: Vec<SpaceSeed>,
    #[serde(default)]
    pub pictures: Vec<PictureSeed>,
}

struct SpaceEntry {
    kind: SpaceKind,
    members: HashMap<UserId, SpaceRole>,
}

#[derive(Default)]
pub struct InMemoryDirectory {
    users: DashMap<UserId, UserSummary>,
    tokens: DashMap<String, UserId>,
    spaces: DashMap<SpaceId, SpaceEntry>,
    pictures: DashMap<PictureId, Option<SpaceId>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: DirectorySeed) -> Self {
        let directory = Self::new();
        for user in seed.users {
            directory.add_user(
                UserSummary {
                    id: user.id,
                    name: user.name,
                    avatar: user.avatar,
                    role: user.role,
                },
                &user.token,
            );
        }
        for space in seed.spaces {
            directory.add_space(space.id, space.kind);
            for member in space.members {
                directory.add_member(space.id, member.user_id, member.role);
            }
        }
        for picture in seed.pictures {
            directory.add_picture(picture.id, picture.space_id);
        }
        directory
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading directory file {}", path.display()))?;
        let seed: DirectorySeed = serde_json::from_str(&raw)
            .with_context(|| format!("parsing directory file {}", path.display()))?;
        Ok(Self::from_seed(seed))
    }

    pub fn add_user(&self, user: UserSummary, token: &str) {
        self.tokens.insert(token.to_string(), user.id);
        self.users.insert(user.id, user);
    }

    pub fn add_space(&self, id: SpaceId, kind: SpaceKind) {
        self.spaces.insert(
            id,
            SpaceEntry {
                kind,
                members: HashMap::new(),
            },
        );
    }

    pub fn add_member(&self, space: SpaceId, user: UserId, role: SpaceRole) {
        if let Some(mut entry) = self.spaces.get_mut(&space) {
            entry.members.insert(user, role);
        }
    }

    pub fn add_picture(&self, id: PictureId, space: Option<SpaceId>) {
        self.pictures.insert(id, space);
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (self.users.len(), self.spaces.len(), self.pictures.len())
    }
}

#[async_trait]
impl Authenticator for InMemoryDirectory {
    async fn authenticate(&self, token: &str) -> Result<Option<UserId>, DirectoryError> {
        Ok(self.tokens.get(token).map(|id| *id))
    }
}

#[async_trait]
impl PictureLookup for InMemoryDirectory {
    async fn find_picture(&self, id: PictureId) -> Result<Option<PictureRecord>, DirectoryError> {
        Ok(self.pictures.get(&id).map(|space_id| PictureRecord {
            id,
            space_id: *space_id,
        }))
    }
}

#[async_trait]
impl SpaceLookup for InMemoryDirectory {
    async fn find_space(&self, id: SpaceId) -> Result<Option<SpaceRecord>, DirectoryError> {
        Ok(self.spaces.get(&id).map(|entry| SpaceRecord {
            id,
            kind: entry.kind,
        }))
    }
}

#[async_trait]
impl AuthorizationProvider for InMemoryDirectory {
    async fn can_edit(&self, user: UserId, picture: PictureId) -> Result<bool, DirectoryError> {
        let Some(space_id) = self.pictures.get(&picture).and_then(|space| *space) else {
            return Ok(false);
        };
        Ok(self
            .spaces
            .get(&space_id)
            .and_then(|entry| entry.members.get(&user).map(SpaceRole::can_edit))
            .unwrap_or(false))
    }
}

#[async_trait]
impl UserView for InMemoryDirectory {
    async fn user_summary(&self, id: UserId) -> Result<Option<UserSummary>, DirectoryError> {
        Ok(self.users.get(&id).map(|user| user.clone()))
    }
}
