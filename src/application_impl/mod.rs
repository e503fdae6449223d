mod otp_service_impl;

pub use otp_service_impl::*;
