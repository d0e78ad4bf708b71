use crate::error::{AppError, AppResult};
use crate::models::complaint::LifecycleError;
use crate::models::{Complaint, ComplaintModel, ComplaintStatus, IdentityModel, UserModel};
use async_trait::async_trait;
use uuid::Uuid;

/// Filter for complaint listings. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct ComplaintFilter {
    pub status: Option<ComplaintStatus>,
    pub user_id: Option<Uuid>,
    /// `(page, per_page)`, 1-based. `None` returns everything.
    pub page: Option<(u64, u64)>,
}

impl ComplaintFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: Option<ComplaintStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn owned_by(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn paged(mut self, page: u64, per_page: u64) -> Self {
        self.page = Some((page.max(1), per_page.max(1)));
        self
    }

    /// Rows to skip for the requested page. `None` when the offset does not
    /// fit, which callers treat as an empty page.
    pub fn offset(&self) -> Option<(u64, u64)> {
        let (page, per_page) = self.page?;
        page.checked_sub(1)?
            .checked_mul(per_page)
            .map(|offset| (offset, per_page))
    }

    pub fn matches(&self, complaint: &ComplaintModel) -> bool {
        self.status
            .map_or(true, |s| complaint.status.parse::<ComplaintStatus>() == Ok(s))
            && self.user_id.map_or(true, |id| complaint.user_id == id)
    }
}

/// Targeted update of a complaint row. `None` leaves the column alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplaintChanges {
    pub status: Option<ComplaintStatus>,
    pub completion_image_url: Option<String>,
    pub citizen_approval: Option<bool>,
}

impl ComplaintChanges {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.completion_image_url.is_none() && self.citizen_approval.is_none()
    }

    /// Statuses a row may currently hold for `status` to be written.
    pub fn allowed_from(&self) -> Option<Vec<ComplaintStatus>> {
        self.status.map(|next| {
            ComplaintStatus::ALL
                .into_iter()
                .filter(|current| current.can_transition_to(next))
                .collect()
        })
    }

    /// Reject a backwards status move or a second completion proof.
    pub fn ensure_applicable(&self, current: &ComplaintModel) -> AppResult<()> {
        if let Some(next) = self.status {
            let status = current
                .status
                .parse::<ComplaintStatus>()
                .unwrap_or(ComplaintStatus::Reported);
            if !status.can_transition_to(next) {
                return Err(AppError::Conflict(format!(
                    "Complaint status cannot move from {} to {}",
                    status, next
                )));
            }
        }
        if self.completion_image_url.is_some() && current.completion_image_url.is_some() {
            return Err(LifecycleError::CompletionAlreadyUploaded.into());
        }
        Ok(())
    }
}

/// Row-oriented data store holding identities, profiles, complaints and NGO
/// responses.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn insert_identity(&self, identity: IdentityModel) -> AppResult<IdentityModel>;

    async fn find_identity_by_email(&self, email: &str) -> AppResult<Option<IdentityModel>>;

    async fn insert_profile(&self, profile: UserModel) -> AppResult<UserModel>;

    async fn find_profile(&self, id: Uuid) -> AppResult<Option<UserModel>>;

    async fn find_profiles(&self, ids: &[Uuid]) -> AppResult<Vec<UserModel>>;

    async fn list_ngos(&self) -> AppResult<Vec<UserModel>>;

    async fn insert_complaint(&self, complaint: ComplaintModel) -> AppResult<Complaint>;

    async fn find_complaint(&self, id: Uuid) -> AppResult<Option<Complaint>>;

    /// Returns the requested page and the total number of matches. A page
    /// past the end is empty.
    async fn list_complaints(&self, filter: &ComplaintFilter) -> AppResult<(Vec<Complaint>, u64)>;

    /// Apply `changes` atomically. Fails with `Conflict` when the row no longer
    /// allows them (see [`ComplaintChanges::ensure_applicable`]).
    async fn update_complaint(&self, id: Uuid, changes: ComplaintChanges) -> AppResult<Complaint>;

    /// Record that `ngo_id` accepted the complaint. Returns `false` if it already had.
    async fn add_response(&self, complaint_id: Uuid, ngo_id: Uuid) -> AppResult<bool>;

    /// Connectivity probe for health checks.
    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: ComplaintStatus, proof: Option<&str>) -> ComplaintModel {
        ComplaintModel {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            description: "Sludge at the outfall".to_string(),
            image_url: None,
            latitude: 19.1,
            longitude: 72.9,
            status: status.as_str().to_string(),
            completion_image_url: proof.map(str::to_string),
            citizen_approval: false,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    #[test]
    fn huge_page_has_no_offset() {
        let filter = ComplaintFilter::all().paged(u64::MAX, 100);
        assert_eq!(filter.offset(), None);
        assert_eq!(ComplaintFilter::all().paged(3, 20).offset(), Some((40, 20)));
        assert_eq!(ComplaintFilter::all().offset(), None);
    }

    #[test]
    fn status_cannot_move_backwards() {
        let changes = ComplaintChanges {
            status: Some(ComplaintStatus::Active),
            ..Default::default()
        };
        assert!(changes.ensure_applicable(&row(ComplaintStatus::Reported, None)).is_ok());
        assert!(changes.ensure_applicable(&row(ComplaintStatus::Active, None)).is_ok());
        assert!(matches!(
            changes.ensure_applicable(&row(ComplaintStatus::Completed, None)),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(
            changes.allowed_from(),
            Some(vec![ComplaintStatus::Reported, ComplaintStatus::Active])
        );
    }

    #[test]
    fn second_proof_is_rejected() {
        let changes = ComplaintChanges {
            completion_image_url: Some("/uploads/b.png".to_string()),
            ..Default::default()
        };
        assert!(changes.ensure_applicable(&row(ComplaintStatus::Active, None)).is_ok());
        assert!(matches!(
            changes.ensure_applicable(&row(ComplaintStatus::Active, Some("/uploads/a.png"))),
            Err(AppError::Conflict(_))
        ));
    }
}
