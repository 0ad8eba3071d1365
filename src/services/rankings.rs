// src/services/rankings.rs

use crate::{
    error::AppError,
    models::ranking::{
        LeaderboardParams, RankInfo, RankScope, SchoolLeaderboardEntry, SchoolRankings,
        UserLeaderboardEntry, UserRankings, assign_ranks,
    },
    services::SharedStore,
};

const DEFAULT_LEADERBOARD_SIZE: i64 = 10;
const MAX_LEADERBOARD_SIZE: i64 = 100;

/// On-demand rank queries. Nothing is cached; every call reads current totals.
#[derive(Clone)]
pub struct Rankings {
    store: SharedStore,
}

impl Rankings {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn user_rank(&self, scope: &RankScope, points: i64) -> Result<RankInfo, AppError> {
        let greater = self.store.count_users_above(scope, points).await?;
        let total = self.store.count_users(scope).await?;
        Ok(RankInfo::from_counts(greater, total))
    }

    pub async fn school_rank(&self, scope: &RankScope, points: i64) -> Result<RankInfo, AppError> {
        let greater = self.store.count_schools_above(scope, points).await?;
        let total = self.store.count_schools(scope).await?;
        Ok(RankInfo::from_counts(greater, total))
    }

    /// Nation-wide rank, plus city, district and school ranks when the user has a school.
    pub async fn user_rankings(&self, user_id: i64) -> Result<UserRankings, AppError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let nation = self.user_rank(&RankScope::Nation, user.points).await?;

        let school = match user.school_id {
            Some(id) => self.store.get_school(id).await?,
            None => None,
        };
        let Some(school) = school else {
            return Ok(UserRankings {
                points: user.points,
                nation,
                city: None,
                district: None,
                school: None,
            });
        };

        let city = self
            .user_rank(&RankScope::City(school.city.clone()), user.points)
            .await?;
        let district = self
            .user_rank(
                &RankScope::District {
                    city: school.city.clone(),
                    district: school.district.clone(),
                },
                user.points,
            )
            .await?;
        let in_school = self
            .user_rank(&RankScope::School(school.id), user.points)
            .await?;

        Ok(UserRankings {
            points: user.points,
            nation,
            city: Some(city),
            district: Some(district),
            school: Some(in_school),
        })
    }

    pub async fn school_rankings(&self, school_id: i64) -> Result<SchoolRankings, AppError> {
        let school = self
            .store
            .get_school(school_id)
            .await?
            .ok_or_else(|| AppError::NotFound("School not found".to_string()))?;

        let points = school.total_points;
        Ok(SchoolRankings {
            total_points: points,
            nation: self.school_rank(&RankScope::Nation, points).await?,
            city: self
                .school_rank(&RankScope::City(school.city.clone()), points)
                .await?,
            district: self
                .school_rank(
                    &RankScope::District {
                        city: school.city,
                        district: school.district,
                    },
                    points,
                )
                .await?,
        })
    }

    pub async fn user_leaderboard(
        &self,
        params: &LeaderboardParams,
    ) -> Result<Vec<UserLeaderboardEntry>, AppError> {
        let scope = scope_from_params(params, true)?;
        let mut entries = self
            .store
            .top_users(&scope, leaderboard_limit(params.limit))
            .await?;
        assign_ranks(&mut entries, |e| e.points, |e, rank| e.rank = rank);
        Ok(entries)
    }

    pub async fn school_leaderboard(
        &self,
        params: &LeaderboardParams,
    ) -> Result<Vec<SchoolLeaderboardEntry>, AppError> {
        let scope = scope_from_params(params, false)?;
        let mut entries = self
            .store
            .top_schools(&scope, leaderboard_limit(params.limit))
            .await?;
        assign_ranks(&mut entries, |e| e.total_points, |e, rank| e.rank = rank);
        Ok(entries)
    }
}

fn leaderboard_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_LEADERBOARD_SIZE)
        .clamp(1, MAX_LEADERBOARD_SIZE)
}

/// Reads `scope` (default `nation`) and the parameters that scope requires.
pub fn scope_from_params(
    params: &LeaderboardParams,
    allow_school: bool,
) -> Result<RankScope, AppError> {
    let required = |value: &Option<String>, name: &str| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest(format!("'{}' is required for this scope", name)))
    };

    match params.scope.as_deref().unwrap_or("nation") {
        "nation" => Ok(RankScope::Nation),
        "city" => Ok(RankScope::City(required(&params.city, "city")?)),
        "district" => Ok(RankScope::District {
            city: required(&params.city, "city")?,
            district: required(&params.district, "district")?,
        }),
        "school" if allow_school => params
            .school_id
            .map(RankScope::School)
            .ok_or_else(|| AppError::BadRequest("'school_id' is required for this scope".to_string())),
        other => Err(AppError::BadRequest(format!("Unknown scope '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{school::SchoolRequest, user_answer::AnswerWrite},
        services::test_support,
    };

    fn school(name: &str, city: &str, district: &str) -> SchoolRequest {
        SchoolRequest {
            name: name.into(),
            city: city.into(),
            district: district.into(),
            school_type: "devlet".into(),
            website: None,
            info_link: None,
            map_link: None,
        }
    }

    async fn give_points(store: &SharedStore, user_id: i64, question_id: i64, points: i64) {
        store
            .record_answer(AnswerWrite::Insert {
                user_id,
                question_id,
                answer_id: None,
                is_correct: true,
                points_earned: points,
                response_time: None,
                answered_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lone_school_with_zero_points_is_first() {
        let store = test_support::store();
        let s = store.create_school(school("Tek Okul", "Bayburt", "Merkez")).await.unwrap();
        let rankings = Rankings::new(store.clone());

        let r = rankings.school_rankings(s.id).await.unwrap();
        assert_eq!(r.city.rank, 1);
        assert_eq!(r.city.total, 1);
        assert_eq!(r.city.percentage, 100.0);
    }

    #[tokio::test]
    async fn user_ranks_per_scope() {
        let store = test_support::store();
        let ankara = store.create_school(school("A", "Ankara", "Çankaya")).await.unwrap();
        let izmir = store.create_school(school("B", "İzmir", "Konak")).await.unwrap();
        let category = store.create_category("Genel".into(), None).await.unwrap();
        let q = test_support::question(&store, category.id, Default::default(), 1).await;

        let me = test_support::user(&store, "me@x.com", Some(ankara.id)).await;
        let peer = test_support::user(&store, "peer@x.com", Some(ankara.id)).await;
        let far = test_support::user(&store, "far@x.com", Some(izmir.id)).await;
        test_support::user(&store, "nobody@x.com", None).await;

        give_points(&store, me.id, q.question.id, 10).await;
        give_points(&store, peer.id, q.question.id, 30).await;
        give_points(&store, far.id, q.question.id, 50).await;

        let r = Rankings::new(store.clone()).user_rankings(me.id).await.unwrap();
        assert_eq!((r.nation.rank, r.nation.total), (3, 4));
        assert_eq!(r.nation.percentage, 50.0);
        let city = r.city.unwrap();
        assert_eq!((city.rank, city.total), (2, 2));
        assert_eq!(r.school.unwrap().rank, 2);
    }

    #[tokio::test]
    async fn user_without_school_only_has_nation_rank() {
        let store = test_support::store();
        let u = test_support::user(&store, "solo@x.com", None).await;
        let r = Rankings::new(store.clone()).user_rankings(u.id).await.unwrap();
        assert_eq!(r.nation.rank, 1);
        assert!(r.city.is_none() && r.district.is_none() && r.school.is_none());
    }

    #[tokio::test]
    async fn leaderboard_shares_ranks_between_ties() {
        let store = test_support::store();
        let category = store.create_category("Genel".into(), None).await.unwrap();
        let q = test_support::question(&store, category.id, Default::default(), 1).await;
        for (i, points) in [40, 40, 10].into_iter().enumerate() {
            let u = test_support::user(&store, &format!("u{i}@x.com"), None).await;
            give_points(&store, u.id, q.question.id, points).await;
        }

        let board = Rankings::new(store.clone())
            .user_leaderboard(&LeaderboardParams::default())
            .await
            .unwrap();
        let ranks: Vec<i64> = board.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 1, 3]);
    }

    #[test]
    fn scope_parameters_are_required() {
        let params = LeaderboardParams {
            scope: Some("district".into()),
            city: Some("Ankara".into()),
            ..Default::default()
        };
        assert!(matches!(
            scope_from_params(&params, true),
            Err(AppError::BadRequest(_))
        ));

        let params = LeaderboardParams {
            scope: Some("school".into()),
            school_id: Some(3),
            ..Default::default()
        };
        assert_eq!(scope_from_params(&params, true).unwrap(), RankScope::School(3));
        assert!(scope_from_params(&params, false).is_err());
    }

    #[test]
    fn limit_is_capped() {
        assert_eq!(leaderboard_limit(None), 10);
        assert_eq!(leaderboard_limit(Some(1_000)), 100);
        assert_eq!(leaderboard_limit(Some(0)), 1);
    }
}
