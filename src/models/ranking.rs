// src/models/ranking.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The peer group a rank is computed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankScope {
    Nation,
    City(String),
    District { city: String, district: String },
    /// Members of one school. Only meaningful for user rankings.
    School(i64),
}

/// Percentage reported for a scope with no members.
pub const EMPTY_SCOPE_PERCENTAGE: f64 = 0.0;

/// Position of an entity among its peers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RankInfo {
    pub rank: i64,
    pub total: i64,
    /// Share of the scope at or below this rank, one decimal.
    pub percentage: f64,
}

impl RankInfo {
    /// `rank = greater + 1`. An empty scope reports rank 1 of 1 with the
    /// minimum percentage, [`EMPTY_SCOPE_PERCENTAGE`].
    pub fn from_counts(greater: i64, total: i64) -> Self {
        if total <= 0 {
            return RankInfo {
                rank: 1,
                total: 1,
                percentage: EMPTY_SCOPE_PERCENTAGE,
            };
        }
        let rank = greater + 1;
        let raw = (total - rank + 1) as f64 / total as f64 * 100.0;
        RankInfo {
            rank,
            total,
            percentage: (raw * 10.0).round() / 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRankings {
    pub points: i64,
    pub nation: RankInfo,
    pub city: Option<RankInfo>,
    pub district: Option<RankInfo>,
    pub school: Option<RankInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchoolRankings {
    pub total_points: i64,
    pub nation: RankInfo,
    pub city: RankInfo,
    pub district: RankInfo,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserLeaderboardEntry {
    /// Filled in after the fetch, see `assign_ranks`.
    #[sqlx(default)]
    pub rank: i64,
    pub user_id: i64,
    pub name: String,
    pub points: i64,
    pub school_id: Option<i64>,
    pub school_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SchoolLeaderboardEntry {
    #[sqlx(default)]
    pub rank: i64,
    pub school_id: i64,
    pub name: String,
    pub city: String,
    pub district: String,
    pub total_points: i64,
    pub total_students: i64,
}

/// Assigns competition ranks to a prefix of a points-descending list.
/// Every strictly greater peer precedes an entry in such a prefix, so the
/// position of the first tied entry is `greater + 1`.
pub fn assign_ranks<T>(entries: &mut [T], points: impl Fn(&T) -> i64, mut set: impl FnMut(&mut T, i64)) {
    let mut current_rank = 0;
    let mut previous: Option<i64> = None;
    for i in 0..entries.len() {
        let p = points(&entries[i]);
        if previous != Some(p) {
            current_rank = i as i64 + 1;
            previous = Some(p);
        }
        set(&mut entries[i], current_rank);
    }
}

/// Query parameters for leaderboards and scoped lookups.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaderboardParams {
    /// 'nation' (default), 'city', 'district' or 'school'.
    pub scope: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub school_id: Option<i64>,
    pub limit: Option<i64>,
}
