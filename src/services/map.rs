use crate::{
    backend::{ComplaintFilter, RowStore},
    error::AppResult,
    models::{Complaint, ComplaintStatus, Role, UserModel},
    services::report_cache::ReportCache,
    state::AppState,
    utils::geo::{within_radius, Coordinates},
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

pub const DEFAULT_CENTER: Coordinates = Coordinates::new(19.2183, 72.9781);
pub const DEFAULT_ZOOM: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MarkerIcon {
    Reported,
    Accepted,
    Completed,
    Ngo,
}

impl MarkerIcon {
    pub fn for_complaint(complaint: &Complaint) -> Self {
        if complaint.status == ComplaintStatus::Completed {
            MarkerIcon::Completed
        } else if complaint.ngo_ids.is_empty() {
            MarkerIcon::Reported
        } else {
            MarkerIcon::Accepted
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MarkerAction {
    Accept,
    UploadCompletion,
    Approve,
}

/// What a viewer may do with a complaint from its popup.
pub fn actions_for(complaint: &Complaint, viewer_id: Uuid, viewer_role: Role) -> Vec<MarkerAction> {
    let mut actions = Vec::new();
    match viewer_role {
        Role::Ngo => {
            let accepted = complaint.is_accepted_by(viewer_id);
            if complaint.status != ComplaintStatus::Completed && !accepted {
                actions.push(MarkerAction::Accept);
            }
            if complaint.ensure_can_attach_completion(viewer_id).is_ok() {
                actions.push(MarkerAction::UploadCompletion);
            }
        }
        Role::Citizen => {
            if complaint.user_id == viewer_id
                && complaint.status == ComplaintStatus::Active
                && complaint.completion_image_url.is_some()
            {
                actions.push(MarkerAction::Approve);
            }
        }
    }
    actions
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarkerPopup {
    Complaint {
        complaint_id: Uuid,
        reporter_name: Option<String>,
        description: String,
        photo_url: Option<String>,
        status: ComplaintStatus,
        #[schema(value_type = String)]
        reported_at: chrono::NaiveDateTime,
        /// Names of the NGOs that accepted, in acceptance order.
        accepted_by: Vec<String>,
        completion_photo_url: Option<String>,
    },
    Ngo {
        ngo_id: Uuid,
        name: String,
        operation_area: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MapMarker {
    pub position: Coordinates,
    pub icon: MarkerIcon,
    pub popup: MarkerPopup,
    pub actions: Vec<MarkerAction>,
}

/// Everything the map renderer needs for one viewer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MapView {
    pub center: Coordinates,
    pub zoom: u8,
    pub markers: Vec<MapMarker>,
}

pub struct MapService {
    store: Arc<dyn RowStore>,
    reports: ReportCache,
}

impl MapService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            reports: state.reports.clone(),
        }
    }

    /// Citizens see their own complaints. NGOs see every complaint, limited
    /// to `radius_km` around their registered location when one is given.
    pub async fn markers(
        &self,
        viewer: &UserModel,
        status: Option<ComplaintStatus>,
        radius_km: Option<f64>,
    ) -> AppResult<MapView> {
        let role = viewer.role();
        let mut filter = ComplaintFilter::all().with_status(status);
        if role == Role::Citizen {
            filter = filter.owned_by(viewer.id);
        }
        let (mut complaints, _) = self.store.list_complaints(&filter).await?;
        self.reports.sync(&complaints).await;

        let origin = viewer.coordinates();
        if let (Role::Ngo, Some(radius_km)) = (role, radius_km) {
            complaints.retain(|c| within_radius(origin, c.location, radius_km));
        }

        let ngos = self.store.list_ngos().await?;
        let mut people: Vec<Uuid> = complaints.iter().map(|c| c.user_id).collect();
        people.sort_unstable();
        people.dedup();
        let names: HashMap<Uuid, String> = self
            .store
            .find_profiles(&people)
            .await?
            .into_iter()
            .chain(ngos.iter().cloned())
            .map(|p| (p.id, p.full_name))
            .collect();

        let mut markers: Vec<MapMarker> = complaints
            .iter()
            .map(|complaint| complaint_marker(complaint, &names, viewer.id, role))
            .collect();
        markers.extend(ngos.iter().filter_map(ngo_marker));

        let center = match (role, origin) {
            (Role::Ngo, Some(origin)) => origin,
            _ => DEFAULT_CENTER,
        };

        Ok(MapView {
            center,
            zoom: DEFAULT_ZOOM,
            markers,
        })
    }
}

fn complaint_marker(
    complaint: &Complaint,
    names: &HashMap<Uuid, String>,
    viewer_id: Uuid,
    viewer_role: Role,
) -> MapMarker {
    MapMarker {
        position: complaint.location,
        icon: MarkerIcon::for_complaint(complaint),
        popup: MarkerPopup::Complaint {
            complaint_id: complaint.id,
            reporter_name: names.get(&complaint.user_id).cloned(),
            description: complaint.description.clone(),
            photo_url: complaint.image_url.clone(),
            status: complaint.status,
            reported_at: complaint.created_at,
            accepted_by: complaint
                .ngo_ids
                .iter()
                .filter_map(|id| names.get(id).cloned())
                .collect(),
            completion_photo_url: complaint.completion_image_url.clone(),
        },
        actions: actions_for(complaint, viewer_id, viewer_role),
    }
}

fn ngo_marker(ngo: &UserModel) -> Option<MapMarker> {
    Some(MapMarker {
        position: ngo.coordinates()?,
        icon: MarkerIcon::Ngo,
        popup: MarkerPopup::Ngo {
            ngo_id: ngo.id,
            name: ngo.full_name.clone(),
            operation_area: ngo.operation_area.clone(),
        },
        actions: Vec::new(),
    })
}
