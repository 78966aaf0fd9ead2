mod common;

use axum::http::StatusCode;
use common::{TestApp, TestUser};
use serde_json::json;
use skillswap_core::Role;

async fn completed_project(app: &TestApp, client: &TestUser, freelancer: &TestUser) -> String {
    let project_id = app.create_project(client, "Finished work", 400.0).await;
    let bid_id = app.submit_bid(&project_id, freelancer, 380.0).await;
    app.put(
        &format!("/api/projects/{project_id}/bids/{bid_id}/accept"),
        client,
        json!({}),
    )
    .await;
    let (status, _) = app
        .put(&format!("/api/projects/{project_id}/complete"), client, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    project_id
}

#[tokio::test]
async fn client_reviews_hired_freelancer_once() {
    let app = TestApp::new().await;
    let client = TestUser::new("Cal", Role::Client);
    let freelancer = TestUser::new("Fay", Role::Freelancer);
    let project_id = completed_project(&app, &client, &freelancer).await;

    let (status, review) = app
        .post(
            "/api/reviews",
            &client,
            json!({ "projectId": project_id, "rating": 4, "comment": "Solid work" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{review}");
    assert_eq!(review["revieweeId"], freelancer.id.as_str());

    let (status, _) = app
        .post(
            "/api/reviews",
            &client,
            json!({ "projectId": project_id, "rating": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, summary) = app
        .get(&format!("/api/reviews/freelancer/{}", freelancer.id), &client)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["totalReviews"], 1);
    assert_eq!(summary["averageRating"], 4.0);

    let (_, by_project) = app
        .get(&format!("/api/reviews/project/{project_id}"), &freelancer)
        .await;
    assert_eq!(by_project.as_array().unwrap().len(), 1);

    let (_, by_reviewer) = app
        .get(&format!("/api/reviews/user/{}", client.id), &freelancer)
        .await;
    assert_eq!(by_reviewer.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn reviews_require_a_completed_project_and_participation() {
    let app = TestApp::new().await;
    let client = TestUser::new("Cal", Role::Client);
    let freelancer = TestUser::new("Fay", Role::Freelancer);

    let open_project = app.create_project(&client, "Still open", 100.0).await;
    let (status, body) = app
        .post(
            "/api/reviews",
            &client,
            json!({ "projectId": open_project, "rating": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["currentStatus"], "open");

    let project_id = completed_project(&app, &client, &freelancer).await;
    let outsider = TestUser::new("Olga", Role::Client);
    let (status, _) = app
        .post(
            "/api/reviews",
            &outsider,
            json!({ "projectId": project_id, "rating": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(
            "/api/reviews",
            &client,
            json!({ "projectId": project_id, "rating": 6 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reviewee_responds_and_reviewer_deletes() {
    let app = TestApp::new().await;
    let client = TestUser::new("Cal", Role::Client);
    let freelancer = TestUser::new("Fay", Role::Freelancer);
    let project_id = completed_project(&app, &client, &freelancer).await;

    let (_, review) = app
        .post(
            "/api/reviews",
            &freelancer,
            json!({ "projectId": project_id, "rating": 5, "comment": "Great client" }),
        )
        .await;
    assert_eq!(review["revieweeId"], client.id.as_str());
    let review_id = review["id"].as_str().unwrap().to_string();
    let response_uri = format!("/api/reviews/{review_id}/response");

    let (status, _) = app
        .put(&response_uri, &freelancer, json!({ "response": "Thanks me" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = app
        .put(&response_uri, &client, json!({ "response": "Thank you!" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["response"], "Thank you!");

    let (status, _) = app
        .put(&response_uri, &client, json!({ "response": "Again" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app.delete(&format!("/api/reviews/{review_id}"), &client).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .delete(&format!("/api/reviews/{review_id}"), &freelancer)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, remaining) = app
        .get(&format!("/api/reviews/project/{project_id}"), &client)
        .await;
    assert!(remaining.as_array().unwrap().is_empty());
}
