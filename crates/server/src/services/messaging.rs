use chrono::Utc;
use skillswap_core::{new_id, validate_id, validate_user_id, verify_metadata_hash, Message};
use sqlx::SqlitePool;

use crate::{
    error::{AppError, Result},
    services::projects::ProjectStore,
};

const MAX_MESSAGE_LEN: usize = 5000;

const MESSAGE_COLUMNS: &str =
    "id, project_id, sender_id, recipient_id, text, timestamp, metadata_hash, read, created_at";

/// An outbound message as received from either the REST or the socket
/// surface.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub project_id: String,
    pub recipient_id: String,
    pub text: String,
    pub timestamp: i64,
    pub metadata_hash: String,
    pub correlation_id: Option<String>,
}

#[derive(Clone)]
pub struct MessageService {
    pool: SqlitePool,
    projects: ProjectStore,
}

impl MessageService {
    pub fn new(pool: SqlitePool, projects: ProjectStore) -> Self {
        Self { pool, projects }
    }

    pub async fn send(&self, sender_id: &str, new: NewMessage) -> Result<Message> {
        validate_id("Project", &new.project_id)?;
        validate_user_id("Recipient", &new.recipient_id)?;

        let text = new.text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Message text is required".to_string()));
        }
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(AppError::Validation(format!(
                "Message text must be at most {MAX_MESSAGE_LEN} characters"
            )));
        }
        if new.recipient_id == sender_id {
            return Err(AppError::Validation(
                "Cannot send a message to yourself".to_string(),
            ));
        }

        let project = self.projects.fetch(&new.project_id).await?;
        if !project.status.is_active() {
            return Err(AppError::Conflict {
                message: format!("Cannot message on a {} project", project.status),
                current_status: Some(project.status.to_string()),
            });
        }
        if !project.is_participant(sender_id) {
            return Err(AppError::Forbidden(
                "Not authorized to message on this project".to_string(),
            ));
        }
        if !project.is_participant(&new.recipient_id) {
            return Err(AppError::NotFound(
                "Recipient is not part of this project".to_string(),
            ));
        }

        if !verify_metadata_hash(
            &new.metadata_hash,
            sender_id,
            &new.recipient_id,
            new.timestamp,
            &new.project_id,
        ) {
            tracing::warn!(
                project_id = %new.project_id,
                sender_id,
                "message metadata hash mismatch"
            );
            return Err(AppError::Validation(
                "Message metadata hash mismatch".to_string(),
            ));
        }

        let message = Message {
            id: new_id(),
            project_id: new.project_id,
            sender_id: sender_id.to_string(),
            recipient_id: new.recipient_id,
            text: text.to_string(),
            timestamp: new.timestamp,
            metadata_hash: new.metadata_hash.to_lowercase(),
            read: false,
            correlation_id: new.correlation_id,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO messages (id, project_id, sender_id, recipient_id, text, timestamp, metadata_hash, read, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.project_id)
        .bind(&message.sender_id)
        .bind(&message.recipient_id)
        .bind(&message.text)
        .bind(message.timestamp)
        .bind(&message.metadata_hash)
        .bind(message.read)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            message_id = %message.id,
            project_id = %message.project_id,
            "message stored"
        );
        Ok(message)
    }

    pub async fn fetch(&self, message_id: &str) -> Result<Message> {
        validate_id("Message", message_id)?;
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?");
        sqlx::query_as::<_, Message>(&sql)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Message not found".to_string()))
    }

    /// Marks a message read. Only its recipient may do so; marking an
    /// already-read message is a no-op.
    pub async fn mark_read(&self, user_id: &str, message_id: &str) -> Result<Message> {
        let mut message = self.fetch(message_id).await?;
        if message.recipient_id != user_id {
            return Err(AppError::Forbidden(
                "Only the recipient can mark a message as read".to_string(),
            ));
        }

        if !message.read {
            sqlx::query("UPDATE messages SET read = 1 WHERE id = ? AND read = 0")
                .bind(message_id)
                .execute(&self.pool)
                .await?;
            message.read = true;
        }
        Ok(message)
    }

    /// Messages exchanged between `user_id` and `other_id` on a project,
    /// oldest first.
    pub async fn conversation(
        &self,
        user_id: &str,
        project_id: &str,
        other_id: &str,
    ) -> Result<Vec<Message>> {
        validate_id("Project", project_id)?;
        validate_user_id("Recipient", other_id)?;

        let project = self.projects.fetch(project_id).await?;
        if !project.is_participant(user_id) {
            return Err(AppError::Forbidden(
                "Not authorized to view messages on this project".to_string(),
            ));
        }

        let messages = sqlx::query_as::<_, Message>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE project_id = ?
              AND ((sender_id = ? AND recipient_id = ?) OR (sender_id = ? AND recipient_id = ?))
            ORDER BY created_at ASC
            "#
        ))
        .bind(project_id)
        .bind(user_id)
        .bind(other_id)
        .bind(other_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }
}
