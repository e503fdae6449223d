mod otp_store_redis;

pub use otp_store_redis::*;
