use serde::{Deserialize, Serialize};

/// The slice of a user account the article read path needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub nickname: String,
}
