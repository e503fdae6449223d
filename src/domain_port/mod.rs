mod clock;
mod otp_sender;
mod otp_store;

pub use clock::*;
pub use otp_sender::*;
pub use otp_store::*;
