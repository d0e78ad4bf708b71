use crate::utils::geo::Coordinates;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "complaints")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub image_url: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[sea_orm(column_type = "String(StringLen::N(20))")]
    pub status: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub completion_image_url: Option<String>,
    pub citizen_approval: bool,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    Reporter,
    #[sea_orm(has_many = "super::ngo_response::Entity")]
    NgoResponses,
}

impl Related<super::ngo_response::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::NgoResponses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Complaint status. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ComplaintStatus {
    Reported,
    Active,
    Completed,
}

impl ComplaintStatus {
    pub const ALL: [ComplaintStatus; 3] = [Self::Reported, Self::Active, Self::Completed];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reported => "Reported",
            Self::Active => "Active",
            Self::Completed => "Completed",
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Reported => 0,
            Self::Active => 1,
            Self::Completed => 2,
        }
    }

    /// Staying put or moving forward is allowed; moving back is not.
    pub const fn can_transition_to(&self, next: ComplaintStatus) -> bool {
        next.rank() >= self.rank()
    }
}

impl fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplaintStatus {
    type Err = String;

    /// Accepts the spellings older clients used (`Filed`, `accepted`, `Resolved`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reported" | "filed" => Ok(Self::Reported),
            "active" | "accepted" => Ok(Self::Active),
            "completed" | "resolved" => Ok(Self::Completed),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Complaint is already completed")]
    AlreadyCompleted,

    #[error("Complaint has not been accepted yet")]
    NotActive,

    #[error("Only an NGO that accepted this complaint can do that")]
    NotParticipant,

    #[error("Completion proof has already been uploaded")]
    CompletionAlreadyUploaded,

    #[error("No completion proof has been uploaded yet")]
    MissingCompletionProof,

    #[error("Only the reporting citizen can do that")]
    NotOwner,
}

/// A complaint together with the NGOs that accepted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Complaint {
    pub id: Uuid,
    pub user_id: Uuid,
    pub description: String,
    pub image_url: Option<String>,
    pub location: Coordinates,
    pub status: ComplaintStatus,
    pub ngo_ids: Vec<Uuid>,
    pub completion_image_url: Option<String>,
    pub citizen_approval: bool,
    #[schema(value_type = String)]
    pub created_at: DateTime,
}

impl Complaint {
    /// Assemble from a row and its response records. Duplicate NGO ids collapse.
    pub fn from_parts(model: Model, ngo_ids: impl IntoIterator<Item = Uuid>) -> Self {
        let mut ids: Vec<Uuid> = Vec::new();
        for id in ngo_ids {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let status = model.status.parse().unwrap_or_else(|err| {
            tracing::warn!("Complaint {} has {}, treating as Reported", model.id, err);
            ComplaintStatus::Reported
        });

        Self {
            id: model.id,
            user_id: model.user_id,
            description: model.description,
            image_url: model.image_url,
            location: Coordinates::new(model.latitude, model.longitude),
            status,
            ngo_ids: ids,
            completion_image_url: model.completion_image_url,
            citizen_approval: model.citizen_approval,
            created_at: model.created_at,
        }
    }

    pub fn is_accepted_by(&self, ngo_id: Uuid) -> bool {
        self.ngo_ids.contains(&ngo_id)
    }

    /// Add an NGO to the list. Returns `false` when it was already there.
    pub fn accept(&mut self, ngo_id: Uuid) -> Result<bool, LifecycleError> {
        if self.status == ComplaintStatus::Completed {
            return Err(LifecycleError::AlreadyCompleted);
        }
        if self.is_accepted_by(ngo_id) {
            return Ok(false);
        }

        self.ngo_ids.push(ngo_id);
        if self.status == ComplaintStatus::Reported {
            self.status = ComplaintStatus::Active;
        }
        Ok(true)
    }

    pub fn ensure_can_attach_completion(&self, ngo_id: Uuid) -> Result<(), LifecycleError> {
        match self.status {
            ComplaintStatus::Completed => return Err(LifecycleError::AlreadyCompleted),
            ComplaintStatus::Reported => return Err(LifecycleError::NotActive),
            ComplaintStatus::Active => {}
        }
        if !self.is_accepted_by(ngo_id) {
            return Err(LifecycleError::NotParticipant);
        }
        if self.completion_image_url.is_some() {
            return Err(LifecycleError::CompletionAlreadyUploaded);
        }
        Ok(())
    }

    /// Record completion proof. Status stays `Active` until the citizen approves.
    pub fn attach_completion(&mut self, ngo_id: Uuid, url: String) -> Result<(), LifecycleError> {
        self.ensure_can_attach_completion(ngo_id)?;
        self.completion_image_url = Some(url);
        Ok(())
    }

    pub fn approve(&mut self, citizen_id: Uuid) -> Result<(), LifecycleError> {
        if self.user_id != citizen_id {
            return Err(LifecycleError::NotOwner);
        }
        match self.status {
            ComplaintStatus::Completed => return Err(LifecycleError::AlreadyCompleted),
            ComplaintStatus::Reported => return Err(LifecycleError::NotActive),
            ComplaintStatus::Active => {}
        }
        if self.completion_image_url.is_none() {
            return Err(LifecycleError::MissingCompletionProof);
        }

        self.status = ComplaintStatus::Completed;
        self.citizen_approval = true;
        Ok(())
    }
}
