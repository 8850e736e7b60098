use serde_json::Value;

/// A validated dispatch request: the contact list a campaign goes out to.
#[derive(Debug)]
pub struct DispatchRequest {
    pub users: Vec<Recipient>,
}

#[derive(Debug, Clone)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid JSON in request body")]
    InvalidJson,
    #[error("Missing 'users' in request body")]
    MissingUsers,
    #[error("'users' must be a non-empty list")]
    EmptyUsers,
    #[error("Each user must be an object with 'email' and 'name'. Error at index {0}")]
    InvalidUserAt(usize),
}

impl DispatchRequest {
    /// Validate a raw request body. Rules are checked in order and the first
    /// failure wins; for malformed user entries the first offending index is
    /// reported.
    pub fn parse(raw: &[u8]) -> Result<Self, ValidationError> {
        let body: Value =
            serde_json::from_slice(raw).map_err(|_| ValidationError::InvalidJson)?;
        let users = body.get("users").ok_or(ValidationError::MissingUsers)?;
        let users = users
            .as_array()
            .filter(|entries| !entries.is_empty())
            .ok_or(ValidationError::EmptyUsers)?;

        let mut recipients = Vec::with_capacity(users.len());
        for (index, user) in users.iter().enumerate() {
            let recipient = Self::parse_recipient(user)
                .ok_or(ValidationError::InvalidUserAt(index))?;
            recipients.push(recipient);
        }

        Ok(Self { users: recipients })
    }

    fn parse_recipient(user: &Value) -> Option<Recipient> {
        let fields = user.as_object()?;
        let email = fields.get("email")?.as_str()?;
        let name = fields.get("name")?.as_str()?;
        Some(Recipient {
            email: email.to_owned(),
            name: name.to_owned(),
        })
    }
}
