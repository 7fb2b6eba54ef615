use serde::{Deserialize, Serialize};

/// A user registration event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessage {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub age: i32,
}

impl UserMessage {
    pub fn new(
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        age: i32,
    ) -> Self {
        Self {
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            age,
        }
    }
}
