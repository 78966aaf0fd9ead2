mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, TestUser};
use futures::future::join_all;
use serde_json::json;
use skillswap_core::Role;
use skillswap_server::error::AppError;

#[tokio::test]
async fn requests_without_token_are_rejected() {
    let app = TestApp::new().await;
    let (status, body) = app.request(Method::GET, "/api/projects", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Not authorized");

    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn only_clients_post_projects() {
    let app = TestApp::new().await;
    let freelancer = TestUser::new("Fay", Role::Freelancer);

    let (status, _) = app
        .post(
            "/api/projects",
            &freelancer,
            json!({ "title": "Logo", "budget": 100.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let client = TestUser::new("Cal", Role::Client);
    let (status, body) = app
        .post("/api/projects", &client, json!({ "title": "  ", "budget": 100.0 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, _) = app
        .post("/api/projects", &client, json!({ "title": "Logo", "budget": -5.0 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn accepting_a_bid_hires_the_freelancer_and_rejects_the_rest() {
    let app = TestApp::new().await;
    let client = TestUser::new("Cal", Role::Client);
    let first = TestUser::new("Fay", Role::Freelancer);
    let second = TestUser::new("Fred", Role::Freelancer);

    let project_id = app.create_project(&client, "Landing page", 500.0).await;
    let first_bid = app.submit_bid(&project_id, &first, 450.0).await;
    let second_bid = app.submit_bid(&project_id, &second, 400.0).await;

    let (status, project) = app
        .put(
            &format!("/api/projects/{project_id}/bids/{first_bid}/accept"),
            &client,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{project}");
    assert_eq!(project["status"], "in_progress");
    assert_eq!(project["freelancerId"], first.id.as_str());
    assert_eq!(project["acceptedBidId"], first_bid.as_str());

    let bids = project["bids"].as_array().unwrap();
    let status_of = |id: &str| {
        bids.iter()
            .find(|bid| bid["id"] == id)
            .map(|bid| bid["status"].clone())
            .unwrap()
    };
    assert_eq!(status_of(&first_bid), "accepted");
    assert_eq!(status_of(&second_bid), "rejected");

    // Reloading shows the persisted state
    let (_, reloaded) = app.get(&format!("/api/projects/{project_id}"), &client).await;
    assert_eq!(reloaded["status"], "in_progress");
    assert_eq!(reloaded["bids"].as_array().unwrap().len(), 2);

    // Bidding on a project that is no longer open is a conflict
    let late = TestUser::new("Lee", Role::Freelancer);
    let (status, body) = app
        .post(
            &format!("/api/projects/{project_id}/bids"),
            &late,
            json!({ "amount": 300.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["currentStatus"], "in_progress");
}

#[tokio::test]
async fn concurrent_accepts_hire_exactly_one_freelancer() {
    let app = TestApp::new().await;
    let client = TestUser::new("Cal", Role::Client);
    let first = TestUser::new("Fay", Role::Freelancer);
    let second = TestUser::new("Fred", Role::Freelancer);

    let project_id = app.create_project(&client, "API", 1000.0).await;
    let first_bid = app.submit_bid(&project_id, &first, 900.0).await;
    let second_bid = app.submit_bid(&project_id, &second, 800.0).await;

    let first_uri = format!("/api/projects/{project_id}/bids/{first_bid}/accept");
    let second_uri = format!("/api/projects/{project_id}/bids/{second_bid}/accept");
    let (a, b) = tokio::join!(
        app.put(&first_uri, &client, json!({})),
        app.put(&second_uri, &client, json!({})),
    );

    let mut statuses = [a.0, b.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);

    let (_, project) = app.get(&format!("/api/projects/{project_id}"), &client).await;
    let accepted: Vec<_> = project["bids"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|bid| bid["status"] == "accepted")
        .collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(project["acceptedBidId"], accepted[0]["id"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bids_on_an_open_project_all_land() {
    let app = TestApp::new().await;
    let client = TestUser::new("Cal", Role::Client);
    let freelancers: Vec<_> = (0..6)
        .map(|n| TestUser::new(&format!("Freelancer{n}"), Role::Freelancer))
        .collect();

    let project_id = app.create_project(&client, "Landing page", 900.0).await;
    let uri = format!("/api/projects/{project_id}/bids");
    let responses = join_all(freelancers.iter().enumerate().map(|(n, freelancer)| {
        app.post(
            &uri,
            freelancer,
            json!({ "amount": 500.0 + n as f64, "message": "Ready to start" }),
        )
    }))
    .await;

    for (status, body) in &responses {
        assert_eq!(*status, StatusCode::OK, "{body}");
    }

    let (_, project) = app.get(&format!("/api/projects/{project_id}"), &client).await;
    assert_eq!(project["status"], "open");
    assert_eq!(project["bids"].as_array().unwrap().len(), 6);
    assert_eq!(project["version"], 7);
}

#[tokio::test]
async fn deleting_keeps_a_project_that_went_in_progress() {
    let app = TestApp::new().await;
    let client = TestUser::new("Cal", Role::Client);
    let freelancer = TestUser::new("Fay", Role::Freelancer);

    let project_id = app.create_project(&client, "Race", 300.0).await;
    let bid_id = app.submit_bid(&project_id, &freelancer, 250.0).await;
    let (status, _) = app
        .put(
            &format!("/api/projects/{project_id}/bids/{bid_id}/accept"),
            &client,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Straight at the store, as if the accept had landed after the route's
    // ownership read.
    let err = app.state.projects.delete(&project_id).await.unwrap_err();
    assert!(
        matches!(
            err,
            AppError::Conflict { ref current_status, .. }
                if current_status.as_deref() == Some("in_progress")
        ),
        "{err:?}"
    );
    let (status, _) = app.get(&format!("/api/projects/{project_id}"), &client).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn only_the_owner_manages_bids() {
    let app = TestApp::new().await;
    let client = TestUser::new("Cal", Role::Client);
    let other = TestUser::new("Olga", Role::Client);
    let freelancer = TestUser::new("Fay", Role::Freelancer);

    let project_id = app.create_project(&client, "Docs", 200.0).await;
    let bid_id = app.submit_bid(&project_id, &freelancer, 180.0).await;

    let (status, body) = app
        .put(
            &format!("/api/projects/{project_id}/bids/{bid_id}/accept"),
            &other,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Only the project owner can accept bids");

    let (status, _) = app
        .put(
            &format!("/api/projects/{project_id}/bids/{bid_id}/accept"),
            &client,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn duplicate_live_bids_are_refused() {
    let app = TestApp::new().await;
    let client = TestUser::new("Cal", Role::Client);
    let freelancer = TestUser::new("Fay", Role::Freelancer);

    let project_id = app.create_project(&client, "Docs", 200.0).await;
    app.submit_bid(&project_id, &freelancer, 180.0).await;

    let (status, body) = app
        .post(
            &format!("/api/projects/{project_id}/bids"),
            &freelancer,
            json!({ "amount": 170.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
}

#[tokio::test]
async fn counter_offer_then_reject() {
    let app = TestApp::new().await;
    let client = TestUser::new("Cal", Role::Client);
    let freelancer = TestUser::new("Fay", Role::Freelancer);

    let project_id = app.create_project(&client, "Video", 800.0).await;
    let bid_id = app.submit_bid(&project_id, &freelancer, 900.0).await;

    let (status, project) = app
        .put(
            &format!("/api/projects/{project_id}/bids/{bid_id}/counter"),
            &client,
            json!({ "amount": 750.0, "message": "Can you do 750?" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{project}");
    let bid = &project["bids"][0];
    assert_eq!(bid["status"], "countered");
    assert_eq!(bid["counterAmount"], 750.0);
    assert_eq!(bid["amount"], 900.0);

    // A countered bid is not pending and cannot be accepted
    let (status, _) = app
        .put(
            &format!("/api/projects/{project_id}/bids/{bid_id}/accept"),
            &client,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, project) = app
        .put(
            &format!("/api/projects/{project_id}/bids/{bid_id}/reject"),
            &client,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(project["bids"][0]["status"], "rejected");
    assert_eq!(project["status"], "open");
}

#[tokio::test]
async fn completing_a_project_records_earnings() {
    let app = TestApp::new().await;
    let client = TestUser::new("Cal", Role::Client);
    let freelancer = TestUser::new("Fay", Role::Freelancer);

    let project_id = app.create_project(&client, "Mobile app", 2000.0).await;
    let bid_id = app.submit_bid(&project_id, &freelancer, 1800.0).await;

    // Completing before hiring anyone is a conflict
    let (status, body) = app
        .put(&format!("/api/projects/{project_id}/complete"), &client, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["currentStatus"], "open");

    app.put(
        &format!("/api/projects/{project_id}/bids/{bid_id}/accept"),
        &client,
        json!({}),
    )
    .await;

    let (status, body) = app
        .put(&format!("/api/projects/{project_id}/complete"), &client, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["project"]["status"], "completed");
    assert_eq!(body["earnings"]["amount"], 1800.0);
    assert_eq!(body["earnings"]["userId"], freelancer.id.as_str());

    let (status, summary) = app.get("/api/users/earnings", &freelancer).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total"], 1800.0);
    assert_eq!(summary["monthly"], 1800.0);
    assert_eq!(summary["history"].as_array().unwrap().len(), 1);
    assert_eq!(summary["monthlyData"].as_array().unwrap().len(), 1);

    // Completing twice books nothing new
    let (status, _) = app
        .put(&format!("/api/projects/{project_id}/complete"), &client, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (_, summary) = app.get("/api/users/earnings", &freelancer).await;
    assert_eq!(summary["total"], 1800.0);
}

#[tokio::test]
async fn status_endpoint_cancels_but_never_reopens() {
    let app = TestApp::new().await;
    let client = TestUser::new("Cal", Role::Client);
    let freelancer = TestUser::new("Fay", Role::Freelancer);

    let project_id = app.create_project(&client, "Copy", 100.0).await;
    app.submit_bid(&project_id, &freelancer, 90.0).await;

    let (status, _) = app
        .put(
            &format!("/api/projects/{project_id}/status"),
            &client,
            json!({ "status": "in_progress" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, project) = app
        .put(
            &format!("/api/projects/{project_id}/status"),
            &client,
            json!({ "status": "cancelled" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(project["status"], "cancelled");
    assert_eq!(project["bids"][0]["status"], "rejected");

    let (status, body) = app
        .put(
            &format!("/api/projects/{project_id}/status"),
            &client,
            json!({ "status": "cancelled" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["currentStatus"], "cancelled");
}

#[tokio::test]
async fn milestones_advance_forward_only() {
    let app = TestApp::new().await;
    let client = TestUser::new("Cal", Role::Client);
    let freelancer = TestUser::new("Fay", Role::Freelancer);

    let project_id = app.create_project(&client, "Site", 1200.0).await;
    let bid_id = app.submit_bid(&project_id, &freelancer, 1100.0).await;

    let (status, project) = app
        .post(
            &format!("/api/projects/{project_id}/milestones"),
            &client,
            json!({ "description": "Wireframes", "amount": 300.0, "dueDate": "2030-01-15" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{project}");
    let milestone_id = project["milestones"][0]["id"].as_str().unwrap().to_string();
    assert_eq!(project["milestones"][0]["dueDate"], "2030-01-15");

    let uri = format!("/api/projects/{project_id}/milestones/{milestone_id}/status");

    // Work only starts once someone is hired
    let (status, _) = app
        .put(&uri, &client, json!({ "status": "in_progress" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.put(
        &format!("/api/projects/{project_id}/bids/{bid_id}/accept"),
        &client,
        json!({}),
    )
    .await;

    let (status, project) = app
        .put(&uri, &freelancer, json!({ "status": "in_progress" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(project["milestones"][0]["status"], "in_progress");

    let (status, _) = app.put(&uri, &freelancer, json!({ "status": "pending" })).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let outsider = TestUser::new("Olga", Role::Freelancer);
    let (status, _) = app
        .put(&uri, &outsider, json!({ "status": "completed" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn edit_and_delete_rules() {
    let app = TestApp::new().await;
    let client = TestUser::new("Cal", Role::Client);
    let freelancer = TestUser::new("Fay", Role::Freelancer);

    let project_id = app.create_project(&client, "Logo", 100.0).await;
    let (status, project) = app
        .put(
            &format!("/api/projects/{project_id}"),
            &client,
            json!({ "title": "Logo v2", "budget": 150.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(project["title"], "Logo v2");
    assert_eq!(project["budget"], 150.0);
    assert_eq!(project["version"], 2);

    let bid_id = app.submit_bid(&project_id, &freelancer, 140.0).await;
    app.put(
        &format!("/api/projects/{project_id}/bids/{bid_id}/accept"),
        &client,
        json!({}),
    )
    .await;

    let (status, body) = app.delete(&format!("/api/projects/{project_id}"), &client).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["currentStatus"], "in_progress");

    let other = app.create_project(&client, "Banner", 50.0).await;
    let (status, _) = app.delete(&format!("/api/projects/{other}"), &freelancer).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.delete(&format!("/api/projects/{other}"), &client).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/api/projects/{other}"), &client).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_ids_are_bad_requests() {
    let app = TestApp::new().await;
    let client = TestUser::new("Cal", Role::Client);
    let (status, body) = app.get("/api/projects/not-a-uuid", &client).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid Project ID format");
}

#[tokio::test]
async fn listing_filters_by_status_and_ownership() {
    let app = TestApp::new().await;
    let client = TestUser::new("Cal", Role::Client);
    let other = TestUser::new("Olga", Role::Client);
    let freelancer = TestUser::new("Fay", Role::Freelancer);

    let mine = app.create_project(&client, "Mine", 100.0).await;
    app.create_project(&other, "Theirs", 100.0).await;
    app.submit_bid(&mine, &freelancer, 90.0).await;

    let (_, all) = app.get("/api/projects", &client).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, owned) = app.get("/api/projects?mine=true", &client).await;
    let owned = owned.as_array().unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0]["id"], mine.as_str());

    let (_, bid_on) = app.get("/api/projects?mine=true", &freelancer).await;
    assert_eq!(bid_on.as_array().unwrap().len(), 1);

    let (_, open) = app.get("/api/projects?status=completed", &client).await;
    assert!(open.as_array().unwrap().is_empty());
}
