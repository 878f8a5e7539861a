//! Оркестратор расчётов.
//!
//! Потребляет нормализованный результат шлюза и атомарно переводит заказ по
//! машине состояний `pending -> paid -> completed` / `pending -> failed`.
//! Все финансовые побочные эффекты (фиксация мест, выпуск билетов,
//! начисление баллов) происходят ровно один раз на заказ, сколько бы раз
//! шлюз ни передоставил свой callback.

use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::gateway::{CallbackOutcome, PaymentOutcome};
use crate::models::order::{self, Order};
use crate::models::payment;
use crate::services::broadcast::SeatEvent;
use crate::services::notify::{TicketLine, TicketPayload};
use crate::AppState;

/// Фиксированное начисление за оплаченный заказ.
const STARS_PER_PAID_ORDER: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementResult {
    /// Заказ оплачен, места зафиксированы, билеты выпущены.
    Settled,
    /// Заказ уже был финализирован ранее; записей не произведено.
    Duplicate,
    /// Отказ шлюза обработан: заказ failed, места освобождены.
    Failed,
}

pub struct SettlementOrchestrator {
    state: Arc<AppState>,
}

impl SettlementOrchestrator {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Единая точка входа для webhook/redirect-обработчиков.
    pub async fn settle(&self, outcome: CallbackOutcome) -> Result<SettlementResult, ApiError> {
        // Платёжная сессия -> заказ
        let payment: Option<(i64, i64)> = sqlx::query_as(
            "SELECT id, order_id FROM payments WHERE gateway_ref = $1 AND provider = $2",
        )
        .bind(&outcome.gateway_ref)
        .bind(outcome.provider)
        .fetch_optional(&self.state.db.pool)
        .await?;

        let (payment_id, order_id) = payment.ok_or(ApiError::NotFound("Платёж не найден"))?;

        match outcome.outcome {
            PaymentOutcome::Success => self.finalize(order_id, payment_id, &outcome).await,
            PaymentOutcome::Failure => self.fail(order_id, payment_id, &outcome).await,
        }
    }

    /// Успех: одна транзакция на все финансовые эффекты.
    async fn finalize(
        &self,
        order_id: i64,
        payment_id: i64,
        outcome: &CallbackOutcome,
    ) -> Result<SettlementResult, ApiError> {
        let pool = &self.state.db.pool;
        let mut tx = pool.begin().await?;

        let row: Option<(i32, i64, i64, String)> = sqlx::query_as(
            "SELECT user_id, showtime_id, total, status FROM orders WHERE id = $1 FOR UPDATE",
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (user_id, showtime_id, total, status) =
            row.ok_or(ApiError::NotFound("Заказ не найден"))?;

        // Защита от передоставки: повторный callback не пишет ничего
        if Order::is_finalized(&status) {
            info!("settlement duplicate for order {} ignored", order_id);
            return Ok(SettlementResult::Duplicate);
        }

        if outcome.amount != total {
            // Подпись уже подтвердила подлинность; расхождение суммы -
            // повод для разбирательства, но не для зависшего заказа
            warn!(
                "amount mismatch on order {}: gateway={} order total={}",
                order_id, outcome.amount, total
            );
        }

        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(order_id)
            .bind(order::ORDER_PAID)
            .execute(&mut *tx)
            .await?;

        // Фиксация мест. Первичный ключ (seat_id, showtime_id) рушит всю
        // транзакцию, если место успело продаться другим путём - менеджер
        // резервирования такое не допускает, но страховка остаётся
        sqlx::query(
            r#"
            INSERT INTO seat_status (seat_id, showtime_id, user_id, status)
            SELECT os.seat_id, $2, $3, 'Booked'
            FROM order_seats os
            WHERE os.order_id = $1
            "#,
        )
        .bind(order_id)
        .bind(showtime_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        // Блокировки сняты: их место занимает постоянная запись
        sqlx::query(
            r#"
            DELETE FROM seat_holds
            WHERE showtime_id = $2
              AND seat_id IN (SELECT seat_id FROM order_seats WHERE order_id = $1)
            "#,
        )
        .bind(order_id)
        .bind(showtime_id)
        .execute(&mut *tx)
        .await?;

        let seat_ids: Vec<i64> =
            sqlx::query_scalar("SELECT seat_id FROM order_seats WHERE order_id = $1 ORDER BY seat_id")
                .bind(order_id)
                .fetch_all(&mut *tx)
                .await?;

        for seat_id in &seat_ids {
            sqlx::query("INSERT INTO tickets (order_id, seat_id, ticket_code) VALUES ($1, $2, $3)")
                .bind(order_id)
                .bind(seat_id)
                .bind(Uuid::new_v4())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE users SET stars = stars + $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(STARS_PER_PAID_ORDER)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE payments SET status = $2, response_data = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(payment_id)
        .bind(payment::PAYMENT_SUCCESS)
        .bind(&outcome.raw)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "order {} settled: {} seats booked, +{} stars for user {}",
            order_id,
            seat_ids.len(),
            STARS_PER_PAID_ORDER,
            user_id
        );

        self.state.hub.publish(
            showtime_id,
            SeatEvent::Booked {
                seat_ids: seat_ids.clone(),
            },
        );

        // Внешние эффекты строго после коммита: их провал не откатывает
        // финансовую часть
        self.deliver_and_complete(order_id).await;

        Ok(SettlementResult::Settled)
    }

    /// Отказ шлюза: заказ failed, оставшиеся блокировки снимаются сразу,
    /// не дожидаясь TTL.
    async fn fail(
        &self,
        order_id: i64,
        payment_id: i64,
        outcome: &CallbackOutcome,
    ) -> Result<SettlementResult, ApiError> {
        let pool = &self.state.db.pool;
        let mut tx = pool.begin().await?;

        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT showtime_id, status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (showtime_id, status) = row.ok_or(ApiError::NotFound("Заказ не найден"))?;

        if Order::is_finalized(&status) {
            // Запоздавший отказ после успешной оплаты - игнорируем
            warn!(
                "failure callback for already paid order {} ignored",
                order_id
            );
            return Ok(SettlementResult::Duplicate);
        }

        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(order_id)
            .bind(order::ORDER_FAILED)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE payments SET status = $2, response_data = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(payment_id)
        .bind(payment::PAYMENT_FAILED)
        .bind(&outcome.raw)
        .execute(&mut *tx)
        .await?;

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
        .await?;

        tx.commit().await?;

        info!(
            "order {} failed ({}), {} seats released",
            order_id,
            outcome.gateway_ref,
            released.len()
        );

        if !released.is_empty() {
            self.state
                .hub
                .publish(showtime_id, SeatEvent::Released { seat_ids: released });
        }

        Ok(SettlementResult::Failed)
    }

    /// Пост-обработка: QR-код, доставка билетов, переход в completed.
    /// `completed` означает "пост-обработка завершена", а не "доставка
    /// удалась".
    async fn deliver_and_complete(&self, order_id: i64) {
        let pool = &self.state.db.pool;

        let qr_code = format!("CTS-{}", Uuid::new_v4().simple());
        if let Err(e) = sqlx::query("UPDATE orders SET qr_code = $2 WHERE id = $1")
            .bind(order_id)
            .bind(&qr_code)
            .execute(pool)
            .await
        {
            error!("failed to store qr code for order {}: {:?}", order_id, e);
        }

        match self.build_payload(order_id, &qr_code).await {
            Ok((email, payload)) => {
                if let Err(e) = self.state.notifier.send(&email, &payload).await {
                    // Заказ остаётся paid; повторная доставка - отдельная забота
                    warn!("ticket delivery for order {} failed: {}", order_id, e);
                }
            }
            Err(e) => {
                warn!(
                    "could not assemble ticket payload for order {}: {:?}",
                    order_id, e
                );
            }
        }

        if let Err(e) = sqlx::query("UPDATE orders SET status = $2 WHERE id = $1 AND status = $3")
            .bind(order_id)
            .bind(order::ORDER_COMPLETED)
            .bind(order::ORDER_PAID)
            .execute(pool)
            .await
        {
            error!("failed to complete order {}: {:?}", order_id, e);
        }
    }

    async fn build_payload(
        &self,
        order_id: i64,
        qr_code: &str,
    ) -> Result<(String, TicketPayload), ApiError> {
        let pool = &self.state.db.pool;

        let header: (String, String, chrono::NaiveDateTime, i64) = sqlx::query_as(
            r#"
            SELECT u.email, st.movie_title, st.starts_at, o.total
            FROM orders o
            JOIN users u ON u.user_id = o.user_id
            JOIN showtimes st ON st.id = o.showtime_id
            WHERE o.id = $1
            "#,
        )
        .bind(order_id)
        .fetch_one(pool)
        .await?;

        let lines: Vec<(String, i32, Uuid)> = sqlx::query_as(
            r#"
            SELECT s.seat_row, s.seat_number, t.ticket_code
            FROM tickets t
            JOIN seats s ON s.id = t.seat_id
            WHERE t.order_id = $1
            ORDER BY s.seat_row, s.seat_number
            "#,
        )
        .bind(order_id)
        .fetch_all(pool)
        .await?;

        let (email, movie_title, starts_at, total) = header;
        Ok((
            email,
            TicketPayload {
                order_id,
                qr_code: qr_code.to_string(),
                movie_title,
                starts_at: starts_at.format("%Y-%m-%d %H:%M").to_string(),
                total,
                tickets: lines
                    .into_iter()
                    .map(|(seat_row, seat_number, code)| TicketLine {
                        seat_row,
                        seat_number,
                        ticket_code: code.to_string(),
                    })
                    .collect(),
            },
        ))
    }
}
