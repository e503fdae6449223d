mod otp_sender_fake;
mod otp_sender_log;
mod otp_sender_smtp;

pub use otp_sender_fake::*;
pub use otp_sender_log::*;
pub use otp_sender_smtp::*;
