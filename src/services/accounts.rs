// src/services/accounts.rs

use validator::Validate;

use crate::{
    error::AppError,
    models::user::{
        LoginRequest, NewUser, RegisterRequest, UpdateProfileRequest, User, UserStats, UserType,
    },
    services::{SharedClock, SharedStore, aggregates::AggregatePropagator},
    utils::{
        hash::{hash_password, verify_password},
        html::clean_optional,
        jwt::sign_jwt,
    },
};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Token signing settings.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub secret: String,
    pub expiration_seconds: u64,
}

/// Registration, login and profile management.
/// Every roster change schedules a refresh of the affected schools.
#[derive(Clone)]
pub struct Accounts {
    store: SharedStore,
    clock: SharedClock,
    aggregates: AggregatePropagator,
    tokens: TokenSettings,
}

impl Accounts {
    pub fn new(
        store: SharedStore,
        clock: SharedClock,
        aggregates: AggregatePropagator,
        tokens: TokenSettings,
    ) -> Self {
        Self {
            store,
            clock,
            aggregates,
            tokens,
        }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<User, AppError> {
        req.validate()?;
        self.create_account(
            NewUser {
                name: req.name.trim().to_string(),
                email: req.email.trim().to_lowercase(),
                password_hash: hash_password(&req.password)?,
                birth_date: req.birth_date,
                user_type: req.user_type,
                school_id: req.school_id,
                class_label: clean_optional(req.class_label.as_deref()),
                gender: clean_optional(req.gender.as_deref()),
                is_admin: false,
            },
        )
        .await
    }

    /// Creates the admin account if the email is not taken yet.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<Option<User>, AppError> {
        let email = email.trim().to_lowercase();
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Ok(None);
        }
        let admin = self
            .create_account(NewUser {
                name: "Admin".to_string(),
                email,
                password_hash: hash_password(password)?,
                birth_date: None,
                user_type: UserType::Lise,
                school_id: None,
                class_label: None,
                gender: None,
                is_admin: true,
            })
            .await?;
        Ok(Some(admin))
    }

    /// Returns a signed token and the user.
    pub async fn login(&self, req: LoginRequest) -> Result<(String, User), AppError> {
        req.validate()?;
        let email = req.email.trim().to_lowercase();

        let invalid = || AppError::AuthError("Invalid email or password".to_string());
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or_else(invalid)?;
        if !verify_password(&req.password, &user.password)? {
            return Err(invalid());
        }

        let token = sign_jwt(
            user.id,
            user.is_admin,
            &self.tokens.secret,
            self.tokens.expiration_seconds,
        )?;
        self.store.touch_login(user.id, self.clock.now()).await?;

        tracing::info!("User {} logged in", user.id);
        Ok((token, user))
    }

    pub async fn get_user(&self, id: i64) -> Result<User, AppError> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Applies the given changes. Moving to another school refreshes both schools.
    pub async fn update_profile(
        &self,
        id: i64,
        mut changes: UpdateProfileRequest,
    ) -> Result<User, AppError> {
        changes.validate()?;
        changes.name = changes.name.map(|n| n.trim().to_string());
        changes.class_label = clean_optional(changes.class_label.as_deref());
        changes.gender = clean_optional(changes.gender.as_deref());

        if let Some(school_id) = changes.school_id {
            if self.store.get_school(school_id).await?.is_none() {
                return Err(AppError::NotFound("School not found".to_string()));
            }
        }

        let before = self.get_user(id).await?;
        let updated = self
            .store
            .update_user(id, changes)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if before.school_id != updated.school_id {
            self.aggregates
                .spawn_refresh([before.school_id, updated.school_id]);
        }
        Ok(updated)
    }

    /// Admin removal of another account with its whole answer history.
    pub async fn delete_user(&self, actor_id: i64, id: i64) -> Result<(), AppError> {
        if actor_id == id {
            return Err(AppError::BadRequest(
                "Admins cannot delete their own account".to_string(),
            ));
        }
        let removed = self
            .store
            .delete_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        self.aggregates.spawn_refresh([removed.school_id]);
        tracing::info!("User {} deleted by {}", id, actor_id);
        Ok(())
    }

    pub async fn user_stats(&self, id: i64) -> Result<UserStats, AppError> {
        self.store
            .user_stats(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Rebuilds `points` from the answer history.
    pub async fn resync_points(&self, id: i64) -> Result<i64, AppError> {
        let points = self
            .store
            .resync_user_points(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        let user = self.get_user(id).await?;
        self.aggregates.spawn_refresh([user.school_id]);
        Ok(points)
    }

    pub async fn list_users(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<(Vec<User>, i64), AppError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0).max(0);
        self.store.list_users(limit, offset).await
    }

    async fn create_account(&self, user: NewUser) -> Result<User, AppError> {
        if let Some(school_id) = user.school_id {
            if self.store.get_school(school_id).await?.is_none() {
                return Err(AppError::NotFound("School not found".to_string()));
            }
        }
        let created = self.store.create_user(user).await?;
        self.aggregates.spawn_refresh([created.school_id]);
        tracing::info!("User {} registered", created.id);
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::school::SchoolRequest,
        services::test_support,
        utils::jwt::verify_jwt,
    };

    fn accounts(store: &SharedStore) -> Accounts {
        Accounts::new(
            store.clone(),
            test_support::clock(),
            AggregatePropagator::new(store.clone()),
            TokenSettings {
                secret: "test-secret".into(),
                expiration_seconds: 600,
            },
        )
    }

    fn register_request(email: &str, school_id: Option<i64>) -> RegisterRequest {
        RegisterRequest {
            name: "Elif Yılmaz".into(),
            email: email.into(),
            password: "gizli-parola".into(),
            birth_date: None,
            user_type: UserType::Ortaokul,
            school_id,
            class_label: Some("7-A".into()),
            gender: None,
        }
    }

    async fn school(store: &SharedStore, name: &str) -> i64 {
        store
            .create_school(SchoolRequest {
                name: name.into(),
                city: "Bursa".into(),
                district: "Nilüfer".into(),
                school_type: "devlet".into(),
                website: None,
                info_link: None,
                map_link: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn register_then_login() {
        let store = test_support::store();
        let accounts = accounts(&store);
        let user = accounts
            .register(register_request("Elif@Example.com", None))
            .await
            .unwrap();
        assert_eq!(user.email, "elif@example.com");
        assert_eq!(user.points, 0);

        let (token, logged_in) = accounts
            .login(LoginRequest {
                email: "elif@example.com".into(),
                password: "gizli-parola".into(),
            })
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);
        assert_eq!(verify_jwt(&token, "test-secret").unwrap().user_id().unwrap(), user.id);
        assert!(accounts.get_user(user.id).await.unwrap().last_login_at.is_some());
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let store = test_support::store();
        let accounts = accounts(&store);
        accounts.register(register_request("a@x.com", None)).await.unwrap();
        let err = accounts
            .login(LoginRequest {
                email: "a@x.com".into(),
                password: "yanlış-parola".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));
    }

    #[tokio::test]
    async fn registering_into_a_missing_school_fails() {
        let store = test_support::store();
        let err = accounts(&store)
            .register(register_request("a@x.com", Some(404)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn changing_school_refreshes_both_rosters() {
        let store = test_support::store();
        let accounts = accounts(&store);
        let old = school(&store, "Eski Okul").await;
        let new = school(&store, "Yeni Okul").await;
        let user = accounts.register(register_request("a@x.com", Some(old))).await.unwrap();

        let updated = accounts
            .update_profile(
                user.id,
                UpdateProfileRequest {
                    school_id: Some(new),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.school_id, Some(new));

        let aggregates = AggregatePropagator::new(store.clone());
        assert_eq!(aggregates.refresh_school(old).await.unwrap().total_students, 0);
        assert_eq!(aggregates.refresh_school(new).await.unwrap().total_students, 1);
    }

    #[tokio::test]
    async fn admin_cannot_delete_self() {
        let store = test_support::store();
        let accounts = accounts(&store);
        let admin = accounts.ensure_admin("root@x.com", "yönetici-1").await.unwrap().unwrap();
        assert!(admin.is_admin);
        assert!(accounts.ensure_admin("root@x.com", "yönetici-1").await.unwrap().is_none());

        assert!(matches!(
            accounts.delete_user(admin.id, admin.id).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn resync_restores_points_from_history() {
        let store = test_support::store();
        let accounts = accounts(&store);
        let user = accounts.register(register_request("a@x.com", None)).await.unwrap();
        assert_eq!(accounts.resync_points(user.id).await.unwrap(), 0);
        assert_eq!(accounts.user_stats(user.id).await.unwrap().accuracy, 0.0);
    }
}
