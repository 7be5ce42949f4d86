use crate::error::{BackendError, StoreError};
use crate::ids;
use crate::schema::{Comment, Reactions};
use crate::store::{COMMENTS_KEY, LocalStore};
use crate::validation::validate_comment_body;
use time::OffsetDateTime;
use tracing::info;

/// Append-only comments, stored locally for every backend.
#[derive(Clone)]
pub struct CommentLog {
    store: LocalStore,
}

impl CommentLog {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Newest first.
    pub fn list(&self, measure_id: &str) -> Vec<Comment> {
        let mut comments: Vec<Comment> = self
            .store
            .read::<Vec<Comment>>(COMMENTS_KEY, Vec::new())
            .into_iter()
            .filter(|comment| comment.measure_id == measure_id)
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        comments
    }

    pub fn add(
        &self,
        measure_id: &str,
        body: &str,
        user_id: &str,
        display_name: &str,
    ) -> Result<Comment, BackendError> {
        validate_comment_body(body)?;

        let comment = self.store.transaction(|tx| -> Result<Comment, StoreError> {
            let mut comments: Vec<Comment> = tx.read(COMMENTS_KEY, Vec::new())?;
            let now = OffsetDateTime::now_utc();
            let comment = Comment {
                id: ids::record_id("comment", now),
                measure_id: measure_id.to_string(),
                user_id: user_id.to_string(),
                user_display_name: display_name.to_string(),
                body: body.trim().to_string(),
                created_at: now,
                reactions: Reactions::default(),
            };
            comments.push(comment.clone());
            tx.write(COMMENTS_KEY, &comments)?;
            Ok(comment)
        })?;

        info!(measure_id, comment_id = %comment.id, "comment added");
        Ok(comment)
    }
}
