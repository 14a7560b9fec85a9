// tests/rating_tests.rs
//
// Community difficulty ratings and their effect on the assessment's derived
// difficulty.

use quizhub::{config::Config, routes, state::AppState};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

async fn spawn_app() -> (String, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "rating_test_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
    };

    let state = AppState {
        pool: pool.clone(),
        config,
    };

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, pool)
}

async fn register_and_login(client: &reqwest::Client, address: &str) -> (String, i64) {
    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let resp = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({ "username": username, "password": "password123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    let login: serde_json::Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "username": username, "password": "password123" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    (
        login["token"].as_str().unwrap().to_string(),
        login["user_id"].as_i64().unwrap(),
    )
}

/// Seeds an assessment owned by `owner_id` plus a finished attempt for
/// `user_id`, straight into the database.
async fn seed_assessment_with_finished_attempt(
    pool: &SqlitePool,
    owner_id: i64,
    user_id: i64,
) -> i64 {
    let category_id =
        sqlx::query_scalar::<_, i64>("INSERT INTO categories (name) VALUES (?) RETURNING id")
            .bind(format!("cat_{}", &uuid::Uuid::new_v4().to_string()[..8]))
            .fetch_one(pool)
            .await
            .unwrap();
    let subcategory_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO subcategories (category_id, name) VALUES (?, ?) RETURNING id",
    )
    .bind(category_id)
    .bind(format!("sub_{}", &uuid::Uuid::new_v4().to_string()[..8]))
    .fetch_one(pool)
    .await
    .unwrap();

    let assessment_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO assessments (user_id, subcategory_id, name, difficulty) \
         VALUES (?, ?, 'Rated', 6.0) RETURNING id",
    )
    .bind(owner_id)
    .bind(subcategory_id)
    .fetch_one(pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO attempts (assessment_id, user_id, attempt_number, start_time, end_time, \
         is_finished, score) VALUES (?, ?, 1, ?, ?, 1, 80.0)",
    )
    .bind(assessment_id)
    .bind(user_id)
    .bind(chrono::Utc::now())
    .bind(chrono::Utc::now())
    .execute(pool)
    .await
    .unwrap();

    assessment_id
}

async fn community_difficulty(
    client: &reqwest::Client,
    address: &str,
    assessment_id: i64,
) -> serde_json::Value {
    let detail: serde_json::Value = client
        .get(format!("{}/api/assessments/{}", address, assessment_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    detail["community_difficulty"].clone()
}

#[tokio::test]
async fn rating_requires_a_finished_attempt() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let (owner_token, owner_id) = register_and_login(&client, &address).await;
    let (rater_token, rater_id) = register_and_login(&client, &address).await;
    let _ = owner_token;

    let assessment_id = seed_assessment_with_finished_attempt(&pool, owner_id, rater_id).await;

    // A third user without any attempt may not rate.
    let (bystander_token, _) = register_and_login(&client, &address).await;
    let resp = client
        .post(format!("{}/api/assessments/{}/rating", address, assessment_id))
        .bearer_auth(&bystander_token)
        .json(&serde_json::json!({ "difficulty": 7.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    // The user with a finished attempt may.
    let resp = client
        .post(format!("{}/api/assessments/{}/rating", address, assessment_id))
        .bearer_auth(&rater_token)
        .json(&serde_json::json!({ "difficulty": 7.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    assert_eq!(community_difficulty(&client, &address, assessment_id).await, 7.0);

    // Only one rating per (user, assessment).
    let resp = client
        .post(format!("{}/api/assessments/{}/rating", address, assessment_id))
        .bearer_auth(&rater_token)
        .json(&serde_json::json!({ "difficulty": 3.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);

    // Out-of-range difficulty.
    let resp = client
        .put(format!("{}/api/assessments/{}/rating", address, assessment_id))
        .bearer_auth(&rater_token)
        .json(&serde_json::json!({ "difficulty": 11.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn ratings_drive_the_community_mean() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let (_, owner_id) = register_and_login(&client, &address).await;
    let (rater_a_token, rater_a_id) = register_and_login(&client, &address).await;
    let (rater_b_token, rater_b_id) = register_and_login(&client, &address).await;

    let assessment_id = seed_assessment_with_finished_attempt(&pool, owner_id, rater_a_id).await;
    sqlx::query(
        "INSERT INTO attempts (assessment_id, user_id, attempt_number, start_time, end_time, \
         is_finished, score) VALUES (?, ?, 1, ?, ?, 1, 60.0)",
    )
    .bind(assessment_id)
    .bind(rater_b_id)
    .bind(chrono::Utc::now())
    .bind(chrono::Utc::now())
    .execute(&pool)
    .await
    .unwrap();

    // No ratings yet: derived difficulty is absent and readers fall back to
    // the author's value.
    assert!(community_difficulty(&client, &address, assessment_id).await.is_null());

    for (token, value) in [(&rater_a_token, 4.0), (&rater_b_token, 8.0)] {
        let resp = client
            .post(format!("{}/api/assessments/{}/rating", address, assessment_id))
            .bearer_auth(token)
            .json(&serde_json::json!({ "difficulty": value }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 201);
    }
    assert_eq!(community_difficulty(&client, &address, assessment_id).await, 6.0);

    // Editing a rating re-averages.
    let resp = client
        .put(format!("{}/api/assessments/{}/rating", address, assessment_id))
        .bearer_auth(&rater_a_token)
        .json(&serde_json::json!({ "difficulty": 2.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(community_difficulty(&client, &address, assessment_id).await, 5.0);

    // Deleting one falls back to the remaining rating; deleting the last
    // clears the derived value entirely.
    let resp = client
        .delete(format!("{}/api/assessments/{}/rating", address, assessment_id))
        .bearer_auth(&rater_a_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(community_difficulty(&client, &address, assessment_id).await, 8.0);

    let resp = client
        .delete(format!("{}/api/assessments/{}/rating", address, assessment_id))
        .bearer_auth(&rater_b_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert!(community_difficulty(&client, &address, assessment_id).await.is_null());

    // Deleting a rating that never existed.
    let resp = client
        .delete(format!("{}/api/assessments/{}/rating", address, assessment_id))
        .bearer_auth(&rater_a_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}
