use crate::{
    backend::{ComplaintChanges, ComplaintFilter, ObjectStorage, RowStore},
    error::{AppError, AppResult, FormErrors},
    models::{Complaint, ComplaintModel, ComplaintStatus, Role},
    services::report_cache::ReportCache,
    state::AppState,
    utils::{
        geo::{haversine_km, within_radius, Coordinates},
        image::{validate_image, ValidatedImage},
    },
    websocket::hub::{ChangeFeed, FeedEvent},
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Raw image part of a multipart form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Fields of the report form as they arrived. Coordinates stay textual so a
/// malformed number is reported like a missing one.
#[derive(Debug, Clone, Default)]
pub struct ComplaintSubmission {
    pub description: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub image: Option<ImageUpload>,
}

fn parse_coordinate(raw: Option<&str>) -> Option<f64> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
}

impl ComplaintSubmission {
    /// Check every field without touching any collaborator.
    fn validate(self) -> AppResult<(String, Coordinates, Option<ValidatedImage>)> {
        let mut errors = FormErrors::new();

        let description = self.description.as_deref().unwrap_or("").trim().to_string();
        if description.is_empty() {
            errors.add("description", "Description is required");
        }

        let location = Coordinates::from_parts(
            parse_coordinate(self.latitude.as_deref()),
            parse_coordinate(self.longitude.as_deref()),
        )
        .filter(Coordinates::is_valid);
        if location.is_none() {
            errors.add("location", "Please select a location on the map");
        }

        let image = match self.image {
            Some(upload) => match validate_image(upload.data, &upload.content_type) {
                Ok(image) => Some(image),
                Err(e) if errors.is_empty() => return Err(AppError::Image(e)),
                Err(e) => {
                    errors.add("image", e.to_string());
                    None
                }
            },
            None => None,
        };

        errors.into_result()?;
        match location {
            Some(location) => Ok((description, location, image)),
            None => Err(AppError::Validation(
                "Please select a location on the map".to_string(),
            )),
        }
    }
}

/// A complaint with its distance from the viewing NGO.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NearbyComplaint {
    #[serde(flatten)]
    pub complaint: Complaint,
    /// Kilometres from the NGO's registered location, absent when it has none.
    pub distance_km: Option<f64>,
}

/// `{scope}/{owner}/{unix_millis}-{uuid}.{ext}`. The random part keeps two
/// uploads in the same millisecond apart.
fn object_key(scope: &str, owner: Uuid, extension: &str) -> String {
    format!(
        "{}/{}/{}-{}.{}",
        scope,
        owner,
        chrono::Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        extension
    )
}

pub fn accepted_message(complaint_id: Uuid) -> String {
    format!("Your complaint ({}) has been accepted by the NGO!", complaint_id)
}

pub struct ComplaintService {
    store: Arc<dyn RowStore>,
    storage: Arc<dyn ObjectStorage>,
    feed: ChangeFeed,
    reports: ReportCache,
    default_radius_km: f64,
}

impl ComplaintService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            storage: state.storage.clone(),
            feed: state.feed.clone(),
            reports: state.reports.clone(),
            default_radius_km: state.nearby_default_radius_km,
        }
    }

    async fn store_image(&self, key: String, image: &ValidatedImage) -> AppResult<String> {
        self.storage
            .upload(&key, &image.data, image.kind.mime_type())
            .await?;
        Ok(self.storage.public_url(&key))
    }

    async fn load(&self, id: Uuid) -> AppResult<Complaint> {
        self.store.find_complaint(id).await?.ok_or(AppError::NotFound)
    }

    /// File a new complaint for a citizen.
    pub async fn submit(
        &self,
        user_id: Uuid,
        role: Role,
        submission: ComplaintSubmission,
    ) -> AppResult<Complaint> {
        if role != Role::Citizen {
            return Err(AppError::Forbidden);
        }
        let (description, location, image) = submission.validate()?;

        let image_url = match image {
            Some(image) => {
                let key = object_key("complaints", user_id, image.kind.extension());
                Some(self.store_image(key, &image).await?)
            }
            None => None,
        };

        let row = ComplaintModel {
            id: Uuid::new_v4(),
            user_id,
            description,
            image_url,
            latitude: location.latitude,
            longitude: location.longitude,
            status: ComplaintStatus::Reported.as_str().to_string(),
            completion_image_url: None,
            citizen_approval: false,
            created_at: chrono::Utc::now().naive_utc(),
        };
        let complaint = self.store.insert_complaint(row).await?;

        self.reports.append(complaint.clone()).await;
        self.feed.broadcast(&FeedEvent::ComplaintCreated {
            complaint_id: complaint.id,
        });

        tracing::info!(complaint_id = %complaint.id, %user_id, "Complaint submitted");
        Ok(complaint)
    }

    /// Add an NGO to the complaint. Repeating the call changes nothing.
    pub async fn accept(&self, ngo_id: Uuid, role: Role, complaint_id: Uuid) -> AppResult<Complaint> {
        if role != Role::Ngo {
            return Err(AppError::Forbidden);
        }

        let mut complaint = self.load(complaint_id).await?;
        let previous = complaint.status;
        if !complaint.accept(ngo_id)? {
            tracing::debug!(%complaint_id, %ngo_id, "Complaint already accepted by this NGO");
            self.reports.update(complaint.clone()).await;
            return Ok(complaint);
        }

        let inserted = self.store.add_response(complaint_id, ngo_id).await?;
        let changes = ComplaintChanges {
            status: (complaint.status != previous).then_some(complaint.status),
            ..Default::default()
        };
        let updated = if changes.is_empty() {
            self.load(complaint_id).await?
        } else {
            self.store.update_complaint(complaint_id, changes).await?
        };

        self.reports.update(updated.clone()).await;
        if inserted {
            self.feed.send_to_user(
                updated.user_id,
                &FeedEvent::ComplaintAccepted {
                    complaint_id,
                    ngo_id,
                    message: accepted_message(complaint_id),
                },
            );
        }

        tracing::info!(%complaint_id, %ngo_id, status = %updated.status, "Complaint accepted");
        Ok(updated)
    }

    /// Attach the NGO's completion photo. The status is left for the
    /// citizen's approval to change.
    pub async fn upload_completion(
        &self,
        ngo_id: Uuid,
        role: Role,
        complaint_id: Uuid,
        upload: Option<ImageUpload>,
    ) -> AppResult<Complaint> {
        if role != Role::Ngo {
            return Err(AppError::Forbidden);
        }
        let upload = upload.ok_or_else(|| {
            let mut errors = FormErrors::new();
            errors.add("image", "Completion image is required");
            AppError::InvalidForm(errors)
        })?;
        let image = validate_image(upload.data, &upload.content_type)?;

        let complaint = self.load(complaint_id).await?;
        complaint.ensure_can_attach_completion(ngo_id)?;

        let key = object_key("completions", complaint_id, image.kind.extension());
        let url = self.store_image(key, &image).await?;

        let mut complaint = complaint;
        complaint.attach_completion(ngo_id, url.clone())?;
        let updated = self
            .store
            .update_complaint(
                complaint_id,
                ComplaintChanges {
                    completion_image_url: Some(url),
                    ..Default::default()
                },
            )
            .await?;

        self.reports.update(updated.clone()).await;
        self.feed.send_to_user(
            updated.user_id,
            &FeedEvent::CompletionUploaded {
                complaint_id,
                ngo_id,
            },
        );

        tracing::info!(%complaint_id, %ngo_id, "Completion proof uploaded");
        Ok(updated)
    }

    /// The reporting citizen confirms the work. Final.
    pub async fn approve(&self, citizen_id: Uuid, complaint_id: Uuid) -> AppResult<Complaint> {
        let mut complaint = self.load(complaint_id).await?;
        complaint.approve(citizen_id)?;

        let updated = self
            .store
            .update_complaint(
                complaint_id,
                ComplaintChanges {
                    status: Some(complaint.status),
                    citizen_approval: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        self.reports.update(updated.clone()).await;
        let event = FeedEvent::ComplaintCompleted { complaint_id };
        for ngo_id in &updated.ngo_ids {
            self.feed.send_to_user(*ngo_id, &event);
        }

        tracing::info!(%complaint_id, %citizen_id, "Completion approved");
        Ok(updated)
    }

    pub async fn list(&self, filter: ComplaintFilter) -> AppResult<(Vec<Complaint>, u64)> {
        let (complaints, total) = self.store.list_complaints(&filter).await?;
        self.reports.sync(&complaints).await;
        Ok((complaints, total))
    }

    /// A citizen's own complaints.
    pub async fn mine(&self, user_id: Uuid, filter: ComplaintFilter) -> AppResult<(Vec<Complaint>, u64)> {
        self.list(filter.owned_by(user_id)).await
    }

    /// Served from the report cache when it holds the complaint.
    pub async fn get(&self, id: Uuid) -> AppResult<Complaint> {
        if let Some(complaint) = self.reports.get(id).await {
            return Ok(complaint);
        }
        let complaint = self.load(id).await?;
        self.reports.append(complaint.clone()).await;
        Ok(complaint)
    }

    /// Complaints around an NGO's registered location. NGOs without one see
    /// everything, without distances.
    pub async fn nearby(
        &self,
        ngo_id: Uuid,
        role: Role,
        radius_km: Option<f64>,
        status: Option<ComplaintStatus>,
    ) -> AppResult<Vec<NearbyComplaint>> {
        if role != Role::Ngo {
            return Err(AppError::Forbidden);
        }
        let radius_km = match radius_km {
            Some(r) if !r.is_finite() || r < 0.0 => {
                return Err(AppError::Validation(
                    "radius_km must be a non-negative number".to_string(),
                ))
            }
            Some(r) => r,
            None => self.default_radius_km,
        };

        let origin = self
            .store
            .find_profile(ngo_id)
            .await?
            .and_then(|profile| profile.coordinates());

        let (complaints, _) = self
            .list(ComplaintFilter::all().with_status(status))
            .await?;

        let nearby = complaints
            .into_iter()
            .filter(|c| within_radius(origin, c.location, radius_km))
            .map(|complaint| NearbyComplaint {
                distance_km: origin.map(|o| haversine_km(o, complaint.location)),
                complaint,
            })
            .collect();
        Ok(nearby)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_submission_reports_every_missing_field() {
        let err = ComplaintSubmission::default().validate().unwrap_err();
        match err {
            AppError::InvalidForm(errors) => {
                assert_eq!(errors.get("description"), Some("Description is required"));
                assert_eq!(
                    errors.get("location"),
                    Some("Please select a location on the map")
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unparsable_coordinates_count_as_missing() {
        let submission = ComplaintSubmission {
            description: Some("Foam on the creek".to_string()),
            latitude: Some("north-ish".to_string()),
            longitude: Some("72.87".to_string()),
            image: None,
        };
        assert!(matches!(
            submission.validate(),
            Err(AppError::InvalidForm(errors)) if errors.get("location").is_some()
        ));
    }

    #[test]
    fn valid_submission_without_image() {
        let submission = ComplaintSubmission {
            description: Some("  Oil slick near pier ".to_string()),
            latitude: Some("19.07".to_string()),
            longitude: Some("72.87".to_string()),
            image: None,
        };
        let (description, location, image) = submission.validate().unwrap();
        assert_eq!(description, "Oil slick near pier");
        assert_eq!(location, Coordinates::new(19.07, 72.87));
        assert!(image.is_none());
    }

    #[test]
    fn bad_image_alone_is_an_image_error() {
        let submission = ComplaintSubmission {
            description: Some("Sewage outflow".to_string()),
            latitude: Some("19.07".to_string()),
            longitude: Some("72.87".to_string()),
            image: Some(ImageUpload {
                data: vec![0; 16],
                content_type: "application/pdf".to_string(),
            }),
        };
        assert!(matches!(submission.validate(), Err(AppError::Image(_))));
    }

    #[test]
    fn object_keys_are_unique_within_a_millisecond() {
        let owner = Uuid::new_v4();
        let first = object_key("complaints", owner, "jpg");
        let second = object_key("complaints", owner, "jpg");
        assert_ne!(first, second);
        assert!(first.starts_with(&format!("complaints/{owner}/")));
        assert!(first.ends_with(".jpg"));
    }

    fn memory_state() -> AppState {
        use crate::backend::{LocalObjectStorage, MemoryRowStore, TokenAuthProvider};
        use crate::config::jwt::JwtConfig;

        let store = Arc::new(MemoryRowStore::new());
        let storage = Arc::new(LocalObjectStorage::new(
            std::env::temp_dir().join(format!("water-talk-{}", Uuid::new_v4())),
            "/uploads",
        ));
        let jwt = JwtConfig {
            secret: "unit_test_secret_that_is_at_least_32_characters".to_string(),
            access_token_expiry: 900,
        };
        let auth = Arc::new(TokenAuthProvider::new(store.clone(), jwt).with_hash_cost(4));
        AppState::new(store, storage, auth)
    }

    #[tokio::test]
    async fn get_is_served_from_the_report_cache() {
        let state = memory_state();
        let service = ComplaintService::new(&state);

        let cached = Complaint::from_parts(
            ComplaintModel {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                description: "Oil slick near pier".to_string(),
                image_url: None,
                latitude: 19.07,
                longitude: 72.87,
                status: "Reported".to_string(),
                completion_image_url: None,
                citizen_approval: false,
                created_at: chrono::Utc::now().naive_utc(),
            },
            [],
        );
        state.reports.append(cached.clone()).await;

        // Only the cache knows this complaint.
        assert_eq!(service.get(cached.id).await.unwrap(), cached);
        assert!(matches!(
            service.get(Uuid::new_v4()).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn submitted_complaint_lands_in_the_cache() {
        let state = memory_state();
        let service = ComplaintService::new(&state);
        let submission = ComplaintSubmission {
            description: Some("Foam on the creek".to_string()),
            latitude: Some("19.2".to_string()),
            longitude: Some("72.97".to_string()),
            image: None,
        };

        let complaint = service
            .submit(Uuid::new_v4(), Role::Citizen, submission)
            .await
            .unwrap();
        assert_eq!(state.reports.get(complaint.id).await, Some(complaint));
    }

    #[test]
    fn accepted_message_names_the_complaint() {
        let id = Uuid::nil();
        assert_eq!(
            accepted_message(id),
            format!("Your complaint ({id}) has been accepted by the NGO!")
        );
    }
}
