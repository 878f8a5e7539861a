use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Seat {
    pub id: i64,
    pub room_id: i64,
    pub seat_row: String,
    pub seat_number: i32,
    pub category: String,
    pub price: i64,
    pub is_enabled: bool,
}

/// Эффективное состояние места в контексте одного сеанса.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatState {
    Available,
    Held,
    Booked,
}

impl SeatState {
    /// Booked всегда важнее Held: проданное место не может показываться
    /// как временно занятое.
    pub fn resolve(booked: bool, held: bool) -> Self {
        if booked {
            SeatState::Booked
        } else if held {
            SeatState::Held
        } else {
            SeatState::Available
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booked_wins_over_held() {
        assert_eq!(SeatState::resolve(true, true), SeatState::Booked);
        assert_eq!(SeatState::resolve(true, false), SeatState::Booked);
    }

    #[test]
    fn held_only_when_active_hold_exists() {
        assert_eq!(SeatState::resolve(false, true), SeatState::Held);
        assert_eq!(SeatState::resolve(false, false), SeatState::Available);
    }
}
