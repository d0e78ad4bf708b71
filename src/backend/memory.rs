use super::rows::{ComplaintChanges, ComplaintFilter, RowStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    Complaint, ComplaintModel, IdentityModel, NgoResponseModel, Role, UserModel,
};
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    identities: Vec<IdentityModel>,
    profiles: Vec<UserModel>,
    complaints: Vec<ComplaintModel>,
    responses: Vec<NgoResponseModel>,
    next_response_id: i32,
}

impl Tables {
    fn assemble(&self, model: &ComplaintModel) -> Complaint {
        let ngo_ids = self
            .responses
            .iter()
            .filter(|r| r.complaint_id == model.id)
            .map(|r| r.ngo_id);
        Complaint::from_parts(model.clone(), ngo_ids)
    }
}

/// Process-local row store. Used by tests and `STORE_BACKEND=memory`.
#[derive(Default)]
pub struct MemoryRowStore {
    tables: RwLock<Tables>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn insert_identity(&self, identity: IdentityModel) -> AppResult<IdentityModel> {
        let mut tables = self.tables.write().await;
        if tables
            .identities
            .iter()
            .any(|i| i.id == identity.id || i.email.eq_ignore_ascii_case(&identity.email))
        {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
        tables.identities.push(identity.clone());
        Ok(identity)
    }

    async fn find_identity_by_email(&self, email: &str) -> AppResult<Option<IdentityModel>> {
        let tables = self.tables.read().await;
        Ok(tables
            .identities
            .iter()
            .find(|i| i.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert_profile(&self, profile: UserModel) -> AppResult<UserModel> {
        let mut tables = self.tables.write().await;
        if tables.profiles.iter().any(|p| p.id == profile.id) {
            return Err(AppError::Conflict("Profile already exists".to_string()));
        }
        tables.profiles.push(profile.clone());
        Ok(profile)
    }

    async fn find_profile(&self, id: Uuid) -> AppResult<Option<UserModel>> {
        let tables = self.tables.read().await;
        Ok(tables.profiles.iter().find(|p| p.id == id).cloned())
    }

    async fn find_profiles(&self, ids: &[Uuid]) -> AppResult<Vec<UserModel>> {
        let tables = self.tables.read().await;
        Ok(tables
            .profiles
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn list_ngos(&self) -> AppResult<Vec<UserModel>> {
        let tables = self.tables.read().await;
        Ok(tables
            .profiles
            .iter()
            .filter(|p| p.role() == Role::Ngo)
            .cloned()
            .collect())
    }

    async fn insert_complaint(&self, complaint: ComplaintModel) -> AppResult<Complaint> {
        let mut tables = self.tables.write().await;
        if tables.complaints.iter().any(|c| c.id == complaint.id) {
            return Err(AppError::Conflict("Complaint already exists".to_string()));
        }
        tables.complaints.push(complaint.clone());
        Ok(tables.assemble(&complaint))
    }

    async fn find_complaint(&self, id: Uuid) -> AppResult<Option<Complaint>> {
        let tables = self.tables.read().await;
        Ok(tables
            .complaints
            .iter()
            .find(|c| c.id == id)
            .map(|c| tables.assemble(c)))
    }

    async fn list_complaints(&self, filter: &ComplaintFilter) -> AppResult<(Vec<Complaint>, u64)> {
        let tables = self.tables.read().await;

        // Newest insert first; the stable sort keeps that order for equal timestamps.
        let mut matching: Vec<&ComplaintModel> = tables
            .complaints
            .iter()
            .rev()
            .filter(|c| filter.matches(c))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let page: Vec<&ComplaintModel> = match (filter.page, filter.offset()) {
            (None, _) => matching,
            (Some(_), Some((offset, per_page))) => matching
                .into_iter()
                .skip(usize::try_from(offset).unwrap_or(usize::MAX))
                .take(usize::try_from(per_page).unwrap_or(usize::MAX))
                .collect(),
            (Some(_), None) => Vec::new(),
        };

        Ok((page.into_iter().map(|c| tables.assemble(c)).collect(), total))
    }

    async fn update_complaint(&self, id: Uuid, changes: ComplaintChanges) -> AppResult<Complaint> {
        let mut tables = self.tables.write().await;
        let model = tables
            .complaints
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(AppError::NotFound)?;
        changes.ensure_applicable(model)?;

        if let Some(status) = changes.status {
            model.status = status.as_str().to_string();
        }
        if let Some(url) = changes.completion_image_url {
            model.completion_image_url = Some(url);
        }
        if let Some(approved) = changes.citizen_approval {
            model.citizen_approval = approved;
        }

        let updated = model.clone();
        Ok(tables.assemble(&updated))
    }

    async fn add_response(&self, complaint_id: Uuid, ngo_id: Uuid) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        if !tables.complaints.iter().any(|c| c.id == complaint_id) {
            return Err(AppError::NotFound);
        }
        if tables
            .responses
            .iter()
            .any(|r| r.complaint_id == complaint_id && r.ngo_id == ngo_id)
        {
            return Ok(false);
        }

        tables.next_response_id += 1;
        let id = tables.next_response_id;
        tables.responses.push(NgoResponseModel {
            id,
            complaint_id,
            ngo_id,
            responded_at: chrono::Utc::now().naive_utc(),
        });
        Ok(true)
    }
}
