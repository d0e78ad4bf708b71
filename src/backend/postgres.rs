use super::rows::{ComplaintChanges, ComplaintFilter, RowStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    complaint, identity, ngo_response, user, Complaint, ComplaintEntity, ComplaintModel, Identity,
    IdentityModel, NgoResponse, Role, User, UserModel,
};
use async_trait::async_trait;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Statement,
};
use std::collections::HashMap;
use uuid::Uuid;

/// Row store backed by Postgres through sea-orm.
#[derive(Clone)]
pub struct PgRowStore {
    db: DatabaseConnection,
}

impl PgRowStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn ngo_ids_for(&self, complaint_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Vec<Uuid>>> {
        let mut map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        if complaint_ids.is_empty() {
            return Ok(map);
        }

        let responses = NgoResponse::find()
            .filter(ngo_response::Column::ComplaintId.is_in(complaint_ids.iter().copied()))
            .order_by_asc(ngo_response::Column::RespondedAt)
            .all(&self.db)
            .await?;

        for response in responses {
            map.entry(response.complaint_id)
                .or_default()
                .push(response.ngo_id);
        }
        Ok(map)
    }

    async fn assemble(&self, models: Vec<ComplaintModel>) -> AppResult<Vec<Complaint>> {
        let ids: Vec<Uuid> = models.iter().map(|m| m.id).collect();
        let mut ngo_ids = self.ngo_ids_for(&ids).await?;
        Ok(models
            .into_iter()
            .map(|m| {
                let ngos = ngo_ids.remove(&m.id).unwrap_or_default();
                Complaint::from_parts(m, ngos)
            })
            .collect())
    }

    async fn assemble_one(&self, model: ComplaintModel) -> AppResult<Complaint> {
        self.assemble(vec![model])
            .await?
            .pop()
            .ok_or(AppError::NotFound)
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    async fn insert_identity(&self, identity: IdentityModel) -> AppResult<IdentityModel> {
        if self.find_identity_by_email(&identity.email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
        Ok(identity.into_active_model().insert(&self.db).await?)
    }

    async fn find_identity_by_email(&self, email: &str) -> AppResult<Option<IdentityModel>> {
        Ok(Identity::find()
            .filter(identity::Column::Email.eq(email.to_ascii_lowercase()))
            .one(&self.db)
            .await?)
    }

    async fn insert_profile(&self, profile: UserModel) -> AppResult<UserModel> {
        Ok(profile.into_active_model().insert(&self.db).await?)
    }

    async fn find_profile(&self, id: Uuid) -> AppResult<Option<UserModel>> {
        Ok(User::find_by_id(id).one(&self.db).await?)
    }

    async fn find_profiles(&self, ids: &[Uuid]) -> AppResult<Vec<UserModel>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(User::find()
            .filter(user::Column::Id.is_in(ids.iter().copied()))
            .all(&self.db)
            .await?)
    }

    async fn list_ngos(&self) -> AppResult<Vec<UserModel>> {
        Ok(User::find()
            .filter(user::Column::Role.eq(Role::Ngo.as_str()))
            .order_by_asc(user::Column::FullName)
            .all(&self.db)
            .await?)
    }

    async fn insert_complaint(&self, complaint: ComplaintModel) -> AppResult<Complaint> {
        let saved = complaint.into_active_model().insert(&self.db).await?;
        Ok(Complaint::from_parts(saved, []))
    }

    async fn find_complaint(&self, id: Uuid) -> AppResult<Option<Complaint>> {
        match ComplaintEntity::find_by_id(id).one(&self.db).await? {
            Some(model) => Ok(Some(self.assemble_one(model).await?)),
            None => Ok(None),
        }
    }

    async fn list_complaints(&self, filter: &ComplaintFilter) -> AppResult<(Vec<Complaint>, u64)> {
        let mut query = ComplaintEntity::find();
        if let Some(status) = filter.status {
            query = query.filter(complaint::Column::Status.eq(status.as_str()));
        }
        if let Some(user_id) = filter.user_id {
            query = query.filter(complaint::Column::UserId.eq(user_id));
        }
        let query = query.order_by_desc(complaint::Column::CreatedAt);

        let (models, total) = match filter.page {
            Some(_) => {
                let total = query.clone().count(&self.db).await?;
                let models = match filter.offset() {
                    Some((offset, per_page)) if offset < total => {
                        query.offset(offset).limit(per_page).all(&self.db).await?
                    }
                    _ => Vec::new(),
                };
                (models, total)
            }
            None => {
                let models = query.all(&self.db).await?;
                let total = models.len() as u64;
                (models, total)
            }
        };

        Ok((self.assemble(models).await?, total))
    }

    async fn update_complaint(&self, id: Uuid, changes: ComplaintChanges) -> AppResult<Complaint> {
        if changes.is_empty() {
            let existing = ComplaintEntity::find_by_id(id)
                .one(&self.db)
                .await?
                .ok_or(AppError::NotFound)?;
            return self.assemble_one(existing).await;
        }

        // The guards live in the WHERE clause so concurrent writers cannot
        // both succeed.
        let mut update = ComplaintEntity::update_many().filter(complaint::Column::Id.eq(id));
        if let Some(status) = changes.status {
            let allowed: Vec<&str> = changes
                .allowed_from()
                .unwrap_or_default()
                .iter()
                .map(|s| s.as_str())
                .collect();
            update = update
                .col_expr(complaint::Column::Status, Expr::value(status.as_str()))
                .filter(complaint::Column::Status.is_in(allowed));
        }
        if let Some(url) = &changes.completion_image_url {
            update = update
                .col_expr(
                    complaint::Column::CompletionImageUrl,
                    Expr::value(Some(url.clone())),
                )
                .filter(complaint::Column::CompletionImageUrl.is_null());
        }
        if let Some(approved) = changes.citizen_approval {
            update = update.col_expr(complaint::Column::CitizenApproval, Expr::value(approved));
        }

        let result = update.exec(&self.db).await?;
        let current = ComplaintEntity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        if result.rows_affected == 0 {
            changes.ensure_applicable(&current)?;
            return Err(AppError::Conflict(
                "Complaint changed while updating".to_string(),
            ));
        }
        self.assemble_one(current).await
    }

    async fn add_response(&self, complaint_id: Uuid, ngo_id: Uuid) -> AppResult<bool> {
        if ComplaintEntity::find_by_id(complaint_id)
            .one(&self.db)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound);
        }

        let model = ngo_response::ActiveModel {
            complaint_id: Set(complaint_id),
            ngo_id: Set(ngo_id),
            responded_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        };

        let inserted = NgoResponse::insert(model)
            .on_conflict(
                OnConflict::columns([
                    ngo_response::Column::ComplaintId,
                    ngo_response::Column::NgoId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(inserted > 0)
    }

    async fn ping(&self) -> bool {
        self.db
            .query_one(Statement::from_string(
                sea_orm::DatabaseBackend::Postgres,
                "SELECT 1".to_string(),
            ))
            .await
            .is_ok()
    }
}
