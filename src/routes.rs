// src/routes.rs

use axum::{
    Router,
    http::Method,
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{attempt, exam},
    state::AppState,
    utils::jwt::{auth_middleware, instructor_middleware},
};

/// Assembles the main application router.
///
/// * Every route requires a valid bearer token.
/// * Authoring and submission lists additionally require an instructor.
/// * Applies global middleware (Trace, CORS) and injects `AppState`.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:3000".parse().expect("static origin"),
            "http://127.0.0.1:3000".parse().expect("static origin"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    // `route_layer` only wraps the methods registered before it, so reads of
    // an exam stay open to learners while writes need an instructor.
    let api_routes = Router::new()
        .route(
            "/exams",
            post(exam::create_exam).route_layer(middleware::from_fn(instructor_middleware)),
        )
        .route(
            "/exams/{id}",
            put(exam::update_exam)
                .delete(exam::delete_exam)
                .route_layer(middleware::from_fn(instructor_middleware))
                .get(exam::get_exam),
        )
        .route(
            "/exams/{id}/submissions",
            get(exam::list_exam_submissions)
                .route_layer(middleware::from_fn(instructor_middleware)),
        )
        .route("/classes/{id}/exams", get(exam::list_class_exams))
        .route("/attempts/start", post(attempt::start_attempt))
        .route("/attempts/submit", post(attempt::submit_attempt))
        .route("/submissions/{id}", get(attempt::get_submission))
        // Auth runs before the instructor check
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api", api_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
