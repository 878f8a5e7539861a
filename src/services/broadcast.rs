use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

/// Размер буфера на топик. Отставший подписчик теряет события (at-most-once);
/// истину он всё равно перечитывает из БД через резолвер доступности.
const TOPIC_CAPACITY: usize = 64;

/// События по местам одного сеанса, в порядке коммита транзакций.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SeatEvent {
    Held { seat_ids: Vec<i64>, user_id: i32 },
    Released { seat_ids: Vec<i64> },
    Booked { seat_ids: Vec<i64> },
}

/// Шина событий: топик на каждый сеанс.
///
/// Публикация - enqueue-and-return, вызывающая сторона никогда не ждёт
/// доставки. Доставка не является источником истины.
pub struct SeatEventHub {
    topics: RwLock<HashMap<i64, broadcast::Sender<SeatEvent>>>,
}

impl SeatEventHub {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, showtime_id: i64) -> broadcast::Receiver<SeatEvent> {
        let mut topics = self.topics.write().unwrap();
        topics
            .entry(showtime_id)
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    pub fn publish(&self, showtime_id: i64, event: SeatEvent) {
        let mut topics = self.topics.write().unwrap();
        if let Some(tx) = topics.get(&showtime_id) {
            // Err = ни одного подписчика; заодно убираем пустой топик
            if tx.send(event).is_err() {
                topics.remove(&showtime_id);
            }
        }
    }
}

impl Default for SeatEventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let hub = SeatEventHub::new();
        let mut rx = hub.subscribe(1);

        hub.publish(
            1,
            SeatEvent::Held {
                seat_ids: vec![10, 11],
                user_id: 7,
            },
        );

        let ev = rx.recv().await.unwrap();
        assert_eq!(
            ev,
            SeatEvent::Held {
                seat_ids: vec![10, 11],
                user_id: 7
            }
        );
    }

    #[tokio::test]
    async fn topics_are_isolated_per_showtime() {
        let hub = SeatEventHub::new();
        let mut rx_one = hub.subscribe(1);
        let mut rx_two = hub.subscribe(2);

        hub.publish(2, SeatEvent::Released { seat_ids: vec![5] });

        let ev = rx_two.recv().await.unwrap();
        assert_eq!(ev, SeatEvent::Released { seat_ids: vec![5] });
        assert!(rx_one.try_recv().is_err());
    }

    #[tokio::test]
    async fn all_watchers_of_a_topic_receive_the_event() {
        let hub = SeatEventHub::new();
        let mut rx_a = hub.subscribe(3);
        let mut rx_b = hub.subscribe(3);

        hub.publish(3, SeatEvent::Booked { seat_ids: vec![1] });

        assert_eq!(
            rx_a.recv().await.unwrap(),
            SeatEvent::Booked { seat_ids: vec![1] }
        );
        assert_eq!(
            rx_b.recv().await.unwrap(),
            SeatEvent::Booked { seat_ids: vec![1] }
        );
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let hub = SeatEventHub::new();
        // Не должно паниковать и не должно копить память под мёртвый топик
        hub.publish(9, SeatEvent::Released { seat_ids: vec![1] });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let ev = SeatEvent::Held {
            seat_ids: vec![4],
            user_id: 2,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains(r#""type":"held""#));
        assert!(json.contains(r#""seat_ids":[4]"#));
    }
}
