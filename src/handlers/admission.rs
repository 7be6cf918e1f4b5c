//! Handshake admission for the picture edit socket

use crate::directory::{
    AuthorizationProvider, Authenticator, DirectoryError, InMemoryDirectory, PictureLookup,
    SpaceLookup, UserView,
};
use crate::protocol::{PictureId, UserId};
use crate::rooms::SessionContext;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Query string of the upgrade request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionParams {
    pub picture_id: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("missing pictureId")]
    MissingPictureId,
    #[error("invalid pictureId: {0:?}")]
    InvalidPictureId(String),
    #[error("not logged in")]
    Unauthenticated,
    #[error("picture {0} not found")]
    PictureNotFound(PictureId),
    #[error("space of picture {0} not found")]
    SpaceNotFound(PictureId),
    #[error("picture {0} is not in a team space")]
    NotCollaborative(PictureId),
    #[error("user {0} may not edit picture {1}")]
    Forbidden(UserId, PictureId),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl AdmissionError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingPictureId | Self::InvalidPictureId(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::PictureNotFound(_) | Self::SpaceNotFound(_) => StatusCode::NOT_FOUND,
            Self::NotCollaborative(_) | Self::Forbidden(..) => StatusCode::FORBIDDEN,
            Self::Directory(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Handshake rejected");
        } else {
            tracing::warn!(error = %self, "Handshake rejected");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Decides whether an upgrade request may become a connection
#[derive(Clone)]
pub struct AdmissionGate {
    authenticator: Arc<dyn Authenticator>,
    pictures: Arc<dyn PictureLookup>,
    spaces: Arc<dyn SpaceLookup>,
    permissions: Arc<dyn AuthorizationProvider>,
    users: Arc<dyn UserView>,
}

impl AdmissionGate {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        pictures: Arc<dyn PictureLookup>,
        spaces: Arc<dyn SpaceLookup>,
        permissions: Arc<dyn AuthorizationProvider>,
        users: Arc<dyn UserView>,
    ) -> Self {
        Self {
            authenticator,
            pictures,
            spaces,
            permissions,
            users,
        }
    }

    pub fn from_directory(directory: Arc<InMemoryDirectory>) -> Self {
        Self::new(
            directory.clone(),
            directory.clone(),
            directory.clone(),
            directory.clone(),
            directory,
        )
    }

    /// Runs every handshake check; has no side effects
    pub async fn admit(
        &self,
        params: &AdmissionParams,
        headers: &HeaderMap,
    ) -> Result<SessionContext, AdmissionError> {
        let raw = params
            .picture_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AdmissionError::MissingPictureId)?;
        let picture_id: PictureId = raw
            .parse()
            .map_err(|_| AdmissionError::InvalidPictureId(raw.to_string()))?;

        let token = credential(params, headers).ok_or(AdmissionError::Unauthenticated)?;
        let user_id = self
            .authenticator
            .authenticate(&token)
            .await?
            .ok_or(AdmissionError::Unauthenticated)?;

        let picture = self
            .pictures
            .find_picture(picture_id)
            .await?
            .ok_or(AdmissionError::PictureNotFound(picture_id))?;

        // Pictures outside a space live in the public gallery and are never co-edited
        let space_id = picture
            .space_id
            .ok_or(AdmissionError::NotCollaborative(picture_id))?;
        let space = self
            .spaces
            .find_space(space_id)
            .await?
            .ok_or(AdmissionError::SpaceNotFound(picture_id))?;
        if !space.kind.is_collaborative() {
            return Err(AdmissionError::NotCollaborative(picture_id));
        }

        if !self.permissions.can_edit(user_id, picture_id).await? {
            return Err(AdmissionError::Forbidden(user_id, picture_id));
        }

        let user = self
            .users
            .user_summary(user_id)
            .await?
            .ok_or(AdmissionError::Unauthenticated)?;

        tracing::info!(picture_id = %picture_id, user_id = %user_id, "Handshake admitted");
        Ok(SessionContext {
            user_id,
            picture_id,
            user,
        })
    }
}

/// `token` query parameter, else `Authorization: Bearer <token>`
fn credential(params: &AdmissionParams, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = params.token.as_deref().filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}
