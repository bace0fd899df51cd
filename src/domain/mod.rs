pub mod booking;
pub mod event;
pub mod money;
pub mod payment_account;
pub mod ports;
pub mod withdrawal;
