#![allow(dead_code)]

use std::net::SocketAddr;

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use skillswap_client::{ClientConfig, ConnectOptions, Session};
use skillswap_core::{new_id, Role};
use skillswap_server::{config::Config, db::Database, middleware::auth::Claims, router, AppState};
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const SECRET: &str = "client-test-secret";

pub struct TestUser {
    pub id: String,
    pub token: String,
}

pub fn user(name: &str, role: Role) -> TestUser {
    let id = new_id();
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
    TestUser { id, token }
}

/// A real server on an ephemeral port, backed by a throwaway database.
pub struct TestServer {
    pub config: ClientConfig,
    _dir: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
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
        let app = router(AppState::new(db, config));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            config: client_config(addr),
            _dir: dir,
        }
    }

    pub fn session(&self, user: &TestUser) -> Session {
        Session::new(self.config.clone(), user.token.clone())
            .expect("session")
            .with_options(fast_options())
    }
}

pub fn client_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig::new(format!("http://{addr}/api"), format!("ws://{addr}/ws"))
}

pub fn fast_options() -> ConnectOptions {
    ConnectOptions {
        ack_timeout: std::time::Duration::from_secs(2),
        reconnect_attempts: 3,
        reconnect_delay: std::time::Duration::from_millis(50),
    }
}
