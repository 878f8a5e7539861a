pub mod availability;
pub mod broadcast;
pub mod notify;
pub mod reservation;
pub mod settlement;
pub mod sweeper;
