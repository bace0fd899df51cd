pub mod accounts;
pub mod balance;
pub mod booking_engine;
pub mod withdrawals;
