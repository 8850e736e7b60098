use validator::ValidateEmail;

/// Validated "from" address for outgoing campaigns.
#[derive(Debug, Clone)]
pub struct SenderEmail(String);

impl SenderEmail {
    pub fn parse(s: String) -> Result<Self, String> {
        if !s.validate_email() {
            return Err(format!("{} is not a valid sender email.", s));
        };
        Ok(Self(s))
    }
}

impl AsRef<str> for SenderEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SenderEmail {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        SenderEmail::parse(value)
    }
}
