use sqlx::FromRow;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::models::{order, payment};
use crate::services::broadcast::SeatEvent;
use crate::AppState;

/// Заказ в pending старше этого срока считается брошенным.
const STALE_ORDER_MINUTES: i32 = 15;

/// Гигиенический проход, не источник корректности: резолвер доступности
/// отсекает просроченные блокировки по часам БД и без него.
pub struct Sweeper {
    state: Arc<AppState>,
}

#[derive(FromRow)]
struct ExpiredHold {
    showtime_id: i64,
    seat_id: i64,
}

impl Sweeper {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Один тик: просроченные блокировки + брошенные заказы.
    pub async fn run_tick(&self) {
        self.sweep_expired_holds().await;
        self.expire_stale_orders().await;
    }

    /// Удаляет все блокировки с истёкшим сроком и рассылает released по
    /// топикам сеансов. DELETE с условием по expires_at не может задеть
    /// только что продлённую блокировку: продление перевыпускает строку
    /// с будущим сроком внутри своей транзакции.
    async fn sweep_expired_holds(&self) {
        let expired: Vec<ExpiredHold> = match sqlx::query_as(
            "DELETE FROM seat_holds WHERE expires_at < NOW() RETURNING showtime_id, seat_id",
        )
        .fetch_all(&self.state.db.pool)
        .await
        {
            Ok(rows) => rows,
            Err(e) => {
                error!("failed to sweep expired holds: {:?}", e);
                return;
            }
        };

        if expired.is_empty() {
            return;
        }

        let by_showtime = group_by_showtime(
            expired
                .into_iter()
                .map(|h| (h.showtime_id, h.seat_id)),
        );

        let total: usize = by_showtime.values().map(Vec::len).sum();
        info!("🧹 swept {} expired holds across {} showtimes", total, by_showtime.len());

        for (showtime_id, seat_ids) in by_showtime {
            self.state
                .hub
                .publish(showtime_id, SeatEvent::Released { seat_ids });
        }
    }

    /// Брошенные заказы: pending старше 15 минут. Каждый заказ обрабатываем
    /// отдельной транзакцией, чтобы один сбой не остановил весь проход.
    async fn expire_stale_orders(&self) {
        let stale: Vec<(i64, i64)> = match sqlx::query_as(
            r#"
            SELECT id, showtime_id FROM orders
            WHERE status = 'pending'
              AND created_at < NOW() - make_interval(mins => $1)
            "#,
        )
        .bind(STALE_ORDER_MINUTES)
        .fetch_all(&self.state.db.pool)
        .await
        {
            Ok(rows) => rows,
            Err(e) => {
                error!("failed to find stale orders: {:?}", e);
                return;
            }
        };

        if stale.is_empty() {
            return;
        }

        info!("💳 found {} stale pending orders to expire", stale.len());

        for (order_id, showtime_id) in stale {
            self.expire_order(order_id, showtime_id).await;
        }
    }

    async fn expire_order(&self, order_id: i64, showtime_id: i64) {
        let mut tx = match self.state.db.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                error!("failed to start transaction for order expiry: {}", e);
                return;
            }
        };

        // Заказ мог оплатиться между выборкой и этой транзакцией
        let marked = sqlx::query("UPDATE orders SET status = $2 WHERE id = $1 AND status = $3")
            .bind(order_id)
            .bind(order::ORDER_FAILED)
            .bind(order::ORDER_PENDING)
            .execute(&mut *tx)
            .await
            .map(|r| r.rows_affected() > 0)
            .unwrap_or(false);

        if !marked {
            let _ = tx.rollback().await;
            return;
        }

        if let Err(e) = sqlx::query(
            "UPDATE payments SET status = $2, updated_at = NOW() WHERE order_id = $1 AND status = $3",
        )
        .bind(order_id)
        .bind(payment::PAYMENT_EXPIRED)
        .bind(payment::PAYMENT_PENDING)
        .execute(&mut *tx)
        .await
        {
            error!("failed to expire payments for order {}: {:?}", order_id, e);
            let _ = tx.rollback().await;
            return;
        }

        let released: Vec<i64> = sqlx::query_scalar(
            r#"
            DELETE FROM seat_holds
            WHERE showtime_id = $2
              AND seat_id IN (SELECT seat_id FROM order_seats WHERE order_id = $1)
            RETURNING seat_id
            "#,
        )
        .bind(order_id)
        .bind(showtime_id)
        .fetch_all(&mut *tx)
        .await
        .unwrap_or_default();

        if tx.commit().await.is_ok() {
            info!(
                "💳 stale order {} expired, {} seats released",
                order_id,
                released.len()
            );
            if !released.is_empty() {
                self.state
                    .hub
                    .publish(showtime_id, SeatEvent::Released { seat_ids: released });
            }
        } else {
            error!("failed to commit expiry transaction for order {}", order_id);
        }
    }
}

fn group_by_showtime(pairs: impl Iterator<Item = (i64, i64)>) -> HashMap<i64, Vec<i64>> {
    let mut grouped: HashMap<i64, Vec<i64>> = HashMap::new();
    for (showtime_id, seat_id) in pairs {
        grouped.entry(showtime_id).or_default().push(seat_id);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_released_seats_by_showtime() {
        let grouped = group_by_showtime(vec![(1, 10), (2, 20), (1, 11)].into_iter());

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&1], vec![10, 11]);
        assert_eq!(grouped[&2], vec![20]);
    }

    #[test]
    fn empty_input_produces_no_topics() {
        let grouped = group_by_showtime(std::iter::empty());
        assert!(grouped.is_empty());
    }
}
