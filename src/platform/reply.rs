//! Reply submission: `POST {api_url}/api/comment`.

use super::{AccessToken, RedditClient, bearer, truncate_body};
use crate::error::PostError;

/// Fullname of a comment: the `t1_` kind prefix plus the bare id.
pub fn comment_fullname(message_id: &str) -> String {
    format!("t1_{message_id}")
}

impl RedditClient {
    pub(crate) async fn comment(
        &self,
        token: &AccessToken,
        message_id: &str,
        text: &str,
    ) -> Result<(), PostError> {
        let thing_id = comment_fullname(message_id);

        let resp = self
            .client
            .post(self.api_url("/api/comment"))
            .header(reqwest::header::AUTHORIZATION, bearer(token))
            .form(&[("text", text), ("thing_id", thing_id.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PostError::Status {
                status,
                body: truncate_body(&body),
            });
        }

        Ok(())
    }
}
