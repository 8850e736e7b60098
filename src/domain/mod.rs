mod dispatch_request;
mod sender_email;

pub use dispatch_request::{DispatchRequest, Recipient, ValidationError};
pub use sender_email::SenderEmail;
