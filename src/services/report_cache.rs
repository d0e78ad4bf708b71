use crate::models::Complaint;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_CAPACITY: usize = 1_000;

/// In-memory mirror of recently seen complaints, keyed by id. Written only
/// after the row store accepted a mutation, so it never holds records the
/// store rejected. Holds at most `capacity` entries; the oldest complaints
/// are evicted first.
#[derive(Clone)]
pub struct ReportCache {
    reports: Arc<RwLock<HashMap<Uuid, Complaint>>>,
    capacity: usize,
}

impl Default for ReportCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            reports: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Insert or replace one record.
    pub async fn append(&self, complaint: Complaint) {
        let mut reports = self.reports.write().await;
        reports.insert(complaint.id, complaint);
        evict_oldest(&mut reports, self.capacity);
    }

    /// Refresh a record after a mutation. Records not cached are left out,
    /// the next read loads them.
    pub async fn update(&self, complaint: Complaint) {
        let mut reports = self.reports.write().await;
        if let Some(existing) = reports.get_mut(&complaint.id) {
            *existing = complaint;
        }
    }

    /// Merge freshly loaded rows into the mirror.
    pub async fn sync(&self, loaded: &[Complaint]) {
        let mut reports = self.reports.write().await;
        for complaint in loaded {
            reports.insert(complaint.id, complaint.clone());
        }
        evict_oldest(&mut reports, self.capacity);
    }

    pub async fn get(&self, id: Uuid) -> Option<Complaint> {
        self.reports.read().await.get(&id).cloned()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.reports.read().await.len()
    }
}

fn evict_oldest(reports: &mut HashMap<Uuid, Complaint>, capacity: usize) {
    if reports.len() <= capacity {
        return;
    }
    let mut by_age: Vec<(chrono::NaiveDateTime, Uuid)> =
        reports.values().map(|r| (r.created_at, r.id)).collect();
    by_age.sort_unstable();

    let excess = reports.len() - capacity;
    for (_, id) in by_age.into_iter().take(excess) {
        reports.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComplaintModel, ComplaintStatus};

    fn complaint(minutes_ago: i64) -> Complaint {
        let model = ComplaintModel {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            description: "Dead fish along the bank".to_string(),
            image_url: None,
            latitude: 19.0,
            longitude: 72.8,
            status: "Reported".to_string(),
            completion_image_url: None,
            citizen_approval: false,
            created_at: chrono::Utc::now().naive_utc() - chrono::Duration::minutes(minutes_ago),
        };
        Complaint::from_parts(model, [])
    }

    #[tokio::test]
    async fn append_then_update_in_place() {
        let cache = ReportCache::new();
        let mut report = complaint(0);
        cache.append(report.clone()).await;

        report.status = ComplaintStatus::Active;
        cache.update(report.clone()).await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(
            cache.get(report.id).await.map(|r| r.status),
            Some(ComplaintStatus::Active)
        );
    }

    #[tokio::test]
    async fn update_skips_unknown_records() {
        let cache = ReportCache::new();
        let report = complaint(0);
        cache.update(report.clone()).await;
        assert!(cache.get(report.id).await.is_none());
    }

    #[tokio::test]
    async fn sync_merges_without_duplicates() {
        let cache = ReportCache::new();
        let first = complaint(0);
        cache.append(first.clone()).await;

        let second = complaint(0);
        cache.sync(&[first.clone(), second.clone()]).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(second.id).await.is_some());
    }

    #[tokio::test]
    async fn oldest_complaints_are_evicted() {
        let cache = ReportCache::with_capacity(2);
        let oldest = complaint(30);
        let middle = complaint(20);
        let newest = complaint(10);

        cache.sync(&[middle.clone(), oldest.clone()]).await;
        cache.append(newest.clone()).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(oldest.id).await.is_none());
        assert!(cache.get(middle.id).await.is_some());
        assert!(cache.get(newest.id).await.is_some());
    }
}
