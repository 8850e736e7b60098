mod campaigns_handler;
mod errors;

pub use campaigns_handler::dispatch_campaign;
pub use errors::DispatchError;
