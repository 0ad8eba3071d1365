// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, categories, jokers, questions, quiz, schools, users},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Public: registration, login, school and category reads.
/// * Authenticated: profile, quiz play, jokers, questions.
/// * Admin: every write to schools, categories and questions, user management.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let require_auth = || middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let user_routes = Router::new()
        .route("/me", get(users::get_me).put(users::update_me))
        .route("/me/stats", get(users::my_stats))
        .route("/me/rankings", get(users::my_rankings))
        .route("/leaderboard", get(users::leaderboard))
        .merge(
            Router::new()
                .route("/", get(admin::list_users))
                .route("/{id}", delete(admin::delete_user))
                .route("/{id}/resync", post(admin::resync_user))
                .layer(middleware::from_fn(admin_middleware)),
        )
        .layer(require_auth());

    let school_routes = Router::new()
        .route("/", get(schools::list_schools))
        .route("/leaderboard", get(schools::leaderboard))
        .route("/{id}", get(schools::get_school))
        .route("/{id}/rankings", get(schools::school_rankings))
        // Admin routes: auth first, then the admin check
        .merge(
            Router::new()
                .route("/", post(admin::create_school))
                .route("/{id}", put(admin::update_school))
                .route("/{id}/refresh", post(admin::refresh_school))
                .layer(middleware::from_fn(admin_middleware))
                .layer(require_auth()),
        );

    let category_routes = Router::new()
        .route("/", get(categories::list_categories))
        .route("/{id}", get(categories::get_category))
        .merge(
            Router::new()
                .route("/", post(admin::create_category))
                .route(
                    "/{id}",
                    put(admin::update_category).delete(admin::delete_category),
                )
                .layer(middleware::from_fn(admin_middleware))
                .layer(require_auth()),
        );

    let question_routes = Router::new()
        .route("/", get(questions::list_questions))
        .route("/{id}", get(questions::get_question))
        .route("/{id}/answer", post(questions::answer_question))
        .merge(
            Router::new()
                .route("/", post(admin::create_question))
                .route(
                    "/{id}",
                    put(admin::update_question).delete(admin::delete_question),
                )
                .layer(middleware::from_fn(admin_middleware)),
        )
        .layer(require_auth());

    let quiz_routes = Router::new()
        .route("/start", post(quiz::start_quiz))
        .route("/answer", post(quiz::submit_answer))
        .route("/daily-limit/{category_id}", get(quiz::daily_limit))
        .layer(require_auth());

    let joker_routes = Router::new()
        .route("/status/{category_id}", get(jokers::joker_status))
        .route("/fifty-percent", post(jokers::use_fifty_percent))
        .route("/double-answer", post(jokers::use_double_answer))
        .route("/double-answer/{question_id}", get(jokers::double_answer_status))
        .layer(require_auth());

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/users", user_routes)
        .nest("/api/schools", school_routes)
        .nest("/api/categories", category_routes)
        .nest("/api/questions", question_routes)
        .nest("/api/quiz", quiz_routes)
        .nest("/api/jokers", joker_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
