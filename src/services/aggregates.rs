// src/services/aggregates.rs

use tokio::task::JoinHandle;

use crate::{error::AppError, models::school::School, services::SharedStore};

/// Keeps `schools.total_points` / `total_students` in line with the member users.
///
/// Totals are always recomputed from scratch, never incremented.
#[derive(Clone)]
pub struct AggregatePropagator {
    store: SharedStore,
}

impl AggregatePropagator {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn refresh_school(&self, school_id: i64) -> Result<School, AppError> {
        self.store
            .refresh_school_totals(school_id)
            .await?
            .ok_or_else(|| AppError::NotFound("School not found".to_string()))
    }

    /// Recomputes the given schools off the request path.
    ///
    /// Failures are logged and dropped. Returns `None` when there is nothing to do.
    pub fn spawn_refresh<I>(&self, school_ids: I) -> Option<JoinHandle<()>>
    where
        I: IntoIterator<Item = Option<i64>>,
    {
        let mut ids: Vec<i64> = school_ids.into_iter().flatten().collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return None;
        }

        let propagator = self.clone();
        Some(tokio::spawn(async move {
            for id in ids {
                match propagator.refresh_school(id).await {
                    Ok(school) => tracing::debug!(
                        "School {} totals refreshed: {} points, {} students",
                        id,
                        school.total_points,
                        school.total_students
                    ),
                    Err(e) => tracing::warn!("Failed to refresh totals of school {}: {}", id, e),
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{school::SchoolRequest, user_answer::AnswerWrite},
        services::test_support,
    };

    fn school() -> SchoolRequest {
        SchoolRequest {
            name: "Kadıköy Anadolu Lisesi".into(),
            city: "İstanbul".into(),
            district: "Kadıköy".into(),
            school_type: "anadolu".into(),
            website: None,
            info_link: None,
            map_link: None,
        }
    }

    #[tokio::test]
    async fn totals_are_recomputed_from_members() {
        let store = test_support::store();
        let s = store.create_school(school()).await.unwrap();
        let a = test_support::user(&store, "a@x.com", Some(s.id)).await;
        test_support::user(&store, "b@x.com", Some(s.id)).await;
        let category = store.create_category("Fen".into(), None).await.unwrap();
        let q = test_support::question(&store, category.id, Default::default(), 1).await;
        store
            .record_answer(AnswerWrite::Insert {
                user_id: a.id,
                question_id: q.question.id,
                answer_id: Some(q.answers[0].id),
                is_correct: true,
                points_earned: 14,
                response_time: None,
                answered_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let propagator = AggregatePropagator::new(store.clone());
        let refreshed = propagator.refresh_school(s.id).await.unwrap();
        assert_eq!(refreshed.total_points, 14);
        assert_eq!(refreshed.total_students, 2);
    }

    #[tokio::test]
    async fn background_refresh_swallows_missing_schools() {
        let store = test_support::store();
        let s = store.create_school(school()).await.unwrap();
        test_support::user(&store, "a@x.com", Some(s.id)).await;

        let propagator = AggregatePropagator::new(store.clone());
        let handle = propagator
            .spawn_refresh([Some(s.id), Some(9_999), None, Some(s.id)])
            .unwrap();
        handle.await.unwrap();

        let school = store.get_school(s.id).await.unwrap().unwrap();
        assert_eq!(school.total_students, 1);
    }

    #[test]
    fn nothing_to_refresh() {
        let propagator = AggregatePropagator::new(test_support::store());
        assert!(propagator.spawn_refresh([None]).is_none());
    }
}
