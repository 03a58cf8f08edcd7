use serde::{Deserialize, Serialize};

/// Who is asking. Authentication happens upstream; the core only consumes the outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessContext {
    /// Administrators bypass collection read rules and see hidden fields.
    pub admin: bool,
    /// Id of the authenticated auth record, if any.
    pub auth_id: Option<String>,
}

impl AccessContext {
    #[must_use]
    pub fn guest() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn admin() -> Self {
        Self {
            admin: true,
            auth_id: None,
        }
    }

    #[must_use]
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            admin: false,
            auth_id: Some(id.into()),
        }
    }

    #[inline]
    pub fn is_admin(&self) -> bool {
        self.admin
    }

    #[inline]
    pub fn is_authenticated(&self) -> bool {
        self.admin || self.auth_id.is_some()
    }
}
