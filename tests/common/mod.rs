// tests/common/mod.rs

#![allow(dead_code)]

use chrono::{Duration, Utc};
use exam_engine::{config::Config, routes, state::AppState, utils::jwt::sign_jwt};
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub const JWT_SECRET: &str = "test_secret_for_integration_tests";

pub struct TestApp {
    pub address: String,
    pub pool: PgPool,
    pub client: reqwest::Client,
}

/// Spawns the app on a random port against the database in `DATABASE_URL`.
/// These tests need a running Postgres.
pub async fn spawn_app() -> TestApp {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url,
        jwt_secret: JWT_SECRET.to_string(),
        rust_log: "error".to_string(),
        server_port: 0,
        submit_grace_seconds: 60,
    };

    let app = routes::create_router(AppState::new(pool.clone(), config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        pool,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    /// Inserts a user with a unique name and returns a bearer token for it.
    pub async fn user(&self, role: &str) -> (i64, String) {
        let username = format!("{}_{}", role, &uuid::Uuid::new_v4().to_string()[..8]);
        let id: i64 = sqlx::query_scalar("INSERT INTO users (username, role) VALUES ($1, $2) RETURNING id")
            .bind(&username)
            .bind(role)
            .fetch_one(&self.pool)
            .await
            .unwrap();

        let token = sign_jwt(id, role, JWT_SECRET, 600).unwrap();
        (id, format!("Bearer {}", token))
    }

    pub async fn post(&self, path: &str, token: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .header("Authorization", token)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put(&self, path: &str, token: &str, body: &Value) -> reqwest::Response {
        self.client
            .put(format!("{}{}", self.address, path))
            .header("Authorization", token)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .header("Authorization", token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Creates an exam and returns its id.
    pub async fn create_exam(&self, token: &str, body: &Value) -> i64 {
        let response = self.post("/api/exams", token, body).await;
        assert_eq!(response.status().as_u16(), 201);
        let created: Value = response.json().await.unwrap();
        created["examId"].as_i64().expect("examId missing")
    }

    /// Opens an attempt and returns the submission id.
    pub async fn start(&self, token: &str, exam_id: i64) -> i64 {
        let response = self.post("/api/attempts/start", token, &json!({ "examId": exam_id })).await;
        assert_eq!(response.status().as_u16(), 200);
        let ticket: Value = response.json().await.unwrap();
        ticket["submissionId"].as_i64().expect("submissionId missing")
    }

    /// Ids of the exam's current questions, in display order.
    pub async fn question_ids(&self, token: &str, exam_id: i64) -> Vec<i64> {
        let exam: Value = self
            .get(&format!("/api/exams/{}", exam_id), token)
            .await
            .json()
            .await
            .unwrap();

        exam["sections"]
            .as_array()
            .unwrap()
            .iter()
            .flat_map(|s| s["questions"].as_array().unwrap().clone())
            .map(|q| q["id"].as_i64().unwrap())
            .collect()
    }
}

pub fn unique_class_id() -> i64 {
    (uuid::Uuid::new_v4().as_u128() & 0x7fff_ffff) as i64
}

/// Exam body open from an hour ago to an hour from now.
pub fn exam_body(class_id: i64, max_attempts: i32, view_answer_mode: &str, sections: Value) -> Value {
    let now = Utc::now();
    json!({
        "classId": class_id,
        "title": "Integration exam",
        "description": "Created by tests",
        "startTime": (now - Duration::hours(1)).to_rfc3339(),
        "endTime": (now + Duration::hours(1)).to_rfc3339(),
        "durationMinutes": 30,
        "maxAttempts": max_attempts,
        "viewAnswerMode": view_answer_mode,
        "sections": sections
    })
}

/// One section with a single multiple-choice question worth 10 points,
/// whose correct option id is "2".
pub fn single_choice_section() -> Value {
    json!([{
        "title": "Part 1",
        "questions": [{
            "type": "multiple_choice",
            "content": "Pick the second option",
            "contentData": { "options": [{"id": "1", "text": "One"}, {"id": "2", "text": "Two"}] },
            "answerKey": { "correct_answers": ["2"] },
            "points": 10
        }]
    }])
}

/// One section mixing the four question types, 10 points in total.
pub fn mixed_section() -> Value {
    json!([{
        "title": "Mixed",
        "questions": [
            {
                "type": "multiple_choice",
                "content": "Pick A",
                "contentData": { "options": [{"id": "a", "text": "A"}, {"id": "b", "text": "B"}] },
                "answerKey": { "correct_answers": ["a"] },
                "points": 2.5
            },
            {
                "type": "fill_in_blank",
                "content": "Capital of France",
                "answerKey": { "correct_answer": "Paris" },
                "points": 2.5
            },
            {
                "type": "matching",
                "content": "Match the formulas",
                "contentData": { "left_items": ["H2O", "NaCl"], "right_items": ["salt", "water"] },
                "answerKey": { "pairs": [{"left": "H2O", "right": "water"}, {"left": "NaCl", "right": "salt"}] },
                "points": 2.5
            },
            {
                "type": "ordering",
                "content": "Order the numbers",
                "contentData": { "items": ["3", "1", "2"] },
                "answerKey": { "correct_order": ["1", "2", "3"] },
                "points": 2.5
            }
        ]
    }])
}
