mod campaigns;
mod health_check;
mod helpers;

pub use campaigns::*;
pub use health_check::*;
pub use helpers::error_chain_fmt;
