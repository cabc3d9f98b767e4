pub mod health;
pub mod history;
pub mod shares;
pub mod ws;
