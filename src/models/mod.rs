pub mod user;
pub mod showtime;
pub mod seat;
pub mod hold;
pub mod order;
pub mod payment;
pub mod ticket;

pub use user::User;
pub use showtime::Showtime;
pub use seat::{Seat, SeatState};
pub use hold::SeatHold;
pub use order::Order;
pub use payment::PaymentRecord;
pub use ticket::Ticket;
