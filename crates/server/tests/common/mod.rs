#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use skillswap_core::{metadata_hash, new_id, Role};
use skillswap_server::{
    config::Config, db::Database, middleware::auth::Claims, router, AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;

pub const SECRET: &str = "test-secret";

#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub token: String,
}

impl TestUser {
    pub fn new(name: &str, role: Role) -> Self {
        Self::with_id(&new_id(), name, role)
    }

    /// A user whose id was minted by the identity provider in its own format.
    pub fn with_id(id: &str, name: &str, role: Role) -> Self {
        let id = id.to_string();
        let claims = Claims {
            sub: id.clone(),
            email: format!("{}@example.com", name.to_lowercase()),
            name: name.to_string(),
            role,
            exp: (Utc::now().timestamp() + 3600) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("sign token");

        Self {
            id,
            name: name.to_string(),
            role,
            token,
        }
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let database_url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("skillswap.db").display()
        );

        let db = Database::connect(&database_url).await.expect("connect");
        db.run_migrations().await.expect("migrate");

        let config = Config {
            port: 0,
            database_url,
            jwt_secret: SECRET.to_string(),
            room_capacity: 64,
        };
        let state = AppState::new(db, config);
        let router = router(state.clone());

        Self {
            state,
            router,
            _dir: dir,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        user: Option<&TestUser>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", user.token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, user: &TestUser) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(user), None).await
    }

    pub async fn post(&self, uri: &str, user: &TestUser, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(user), Some(body)).await
    }

    pub async fn put(&self, uri: &str, user: &TestUser, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(user), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, user: &TestUser) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, Some(user), None).await
    }

    /// Posts a project as `owner` and returns its id.
    pub async fn create_project(&self, owner: &TestUser, title: &str, budget: f64) -> String {
        let (status, body) = self
            .post(
                "/api/projects",
                owner,
                serde_json::json!({ "title": title, "description": "", "budget": budget }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["id"].as_str().expect("project id").to_string()
    }

    /// Submits a bid and returns its id.
    pub async fn submit_bid(&self, project_id: &str, freelancer: &TestUser, amount: f64) -> String {
        let (status, body) = self
            .post(
                &format!("/api/projects/{project_id}/bids"),
                freelancer,
                serde_json::json!({ "amount": amount, "message": "I can do it" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["bids"]
            .as_array()
            .and_then(|bids| {
                bids.iter()
                    .find(|bid| bid["freelancerId"] == freelancer.id.as_str())
            })
            .and_then(|bid| bid["id"].as_str())
            .expect("bid id")
            .to_string()
    }
}

/// A REST message body with a valid integrity hash.
pub fn message_body(
    sender: &TestUser,
    recipient: &TestUser,
    project_id: &str,
    text: &str,
) -> Value {
    let timestamp = Utc::now().timestamp_millis();
    serde_json::json!({
        "projectId": project_id,
        "recipientId": recipient.id,
        "text": text,
        "timestamp": timestamp,
        "metadataHash": metadata_hash(&sender.id, &recipient.id, timestamp, project_id),
    })
}
