// src/routes.rs

use axum::{
    Router,
    http::Method,
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, assessment, attempt, auth, leaderboard, profile, question, rating},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, assessments, attempts, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (database pool + config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_layer = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    // Browsing is public; authoring and rating require a token. The creation
    // route shares "/" with the public listing, so only its POST method
    // carries the auth layer.
    let assessment_routes = Router::new()
        .route(
            "/",
            get(assessment::list_assessments)
                .merge(post(assessment::create_assessment).layer(auth_layer.clone())),
        )
        .route("/{id}", get(assessment::get_assessment))
        .merge(
            Router::new()
                .route("/{id}/activate", put(assessment::activate_assessment))
                .route("/{id}/deactivate", put(assessment::deactivate_assessment))
                .route("/{id}/questions", post(question::create_question))
                .route(
                    "/{id}/questions/activate-bulk",
                    post(question::bulk_activate_questions),
                )
                .route(
                    "/{id}/rating",
                    post(rating::create_rating)
                        .put(rating::update_rating)
                        .delete(rating::delete_rating),
                )
                .layer(auth_layer.clone()),
        );

    let question_routes = Router::new()
        .route("/{id}/choices", post(question::create_choice))
        .route("/{id}/activate", put(question::activate_question))
        .layer(auth_layer.clone());

    let attempt_routes = Router::new()
        .route("/", post(attempt::create_attempt))
        .route("/{id}", get(attempt::get_attempt))
        .route("/{id}/finalize", post(attempt::finalize_attempt))
        .layer(auth_layer.clone());

    let profile_routes = Router::new()
        .route("/me", get(profile::get_me))
        .layer(auth_layer.clone());

    let admin_routes = Router::new()
        .route("/categories", post(admin::create_category))
        .route("/subcategories", post(admin::create_subcategory))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(auth_layer);

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/assessments", assessment_routes)
        .nest("/api/questions", question_routes)
        .nest("/api/attempts", attempt_routes)
        .nest("/api/profile", profile_routes)
        .nest("/api/admin", admin_routes)
        .route("/api/leaderboard", get(leaderboard::get_leaderboard))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
