use axum::{extract::State, routing::get, Json, Router};
use skillswap_core::NotificationTemplate;

use crate::{error::Result, middleware::auth::AuthUser, AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_templates))
}

async fn list_templates(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<NotificationTemplate>>> {
    let templates = sqlx::query_as::<_, NotificationTemplate>(
        "SELECT key, title, body FROM notification_templates ORDER BY key",
    )
    .fetch_all(&state.db.pool)
    .await?;
    Ok(Json(templates))
}
