mod otp_store_memory;

pub use otp_store_memory::*;
