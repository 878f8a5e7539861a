use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::services::broadcast::SeatEvent;
use crate::AppState;

/// Время жизни блокировки места. Единственный таймаут-авторитет:
/// отдельного API отмены по таймауту нет.
pub const HOLD_TTL_SECS: i64 = 300;

pub struct ReservationManager {
    state: Arc<AppState>,
}

#[derive(Debug)]
pub struct Granted {
    pub seat_ids: Vec<i64>,
    pub expires_at: DateTime<Utc>,
    pub hold_ttl_secs: i64,
}

impl ReservationManager {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Попытка захватить набор мест целиком: всё или ничего.
    ///
    /// Одна транзакция на попытку. Повторный вызов тем же пользователем
    /// для тех же мест продлевает его блокировки (перевыпуск TTL).
    pub async fn reserve(
        &self,
        showtime_id: i64,
        seat_ids: &[i64],
        user_id: i32,
    ) -> Result<Granted, ApiError> {
        validate_seat_set(showtime_id, seat_ids)?;

        let pool = &self.state.db.pool;

        let mut tx = pool.begin().await?;

        // Сеанс существует и не отменён
        let showtime: Option<(i64, String)> =
            sqlx::query_as("SELECT room_id, status FROM showtimes WHERE id = $1")
                .bind(showtime_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (room_id, status) = showtime.ok_or(ApiError::NotFound("Сеанс не найден"))?;
        if status != crate::models::showtime::SHOWTIME_ACTIVE {
            return Err(ApiError::Validation("Сеанс отменён".to_string()));
        }

        // Все места принадлежат залу сеанса и включены
        let known: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM seats WHERE id = ANY($1) AND room_id = $2 AND is_enabled",
        )
        .bind(seat_ids)
        .bind(room_id)
        .fetch_one(&mut *tx)
        .await?;
        if known != seat_ids.len() as i64 {
            return Err(ApiError::Validation(
                "Некоторые места не существуют или отключены".to_string(),
            ));
        }

        // 1) Проданные места - отказ сразу, Booked неоспорим
        let booked: Vec<i64> = sqlx::query_scalar(
            "SELECT seat_id FROM seat_status WHERE showtime_id = $1 AND seat_id = ANY($2)",
        )
        .bind(showtime_id)
        .bind(seat_ids)
        .fetch_all(&mut *tx)
        .await?;
        if !booked.is_empty() {
            return Err(ApiError::Conflict { seat_ids: booked });
        }

        // 2) Чужие непросроченные блокировки; FOR UPDATE сериализует
        //    конкурентов на одних и тех же строках
        let foreign: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT seat_id FROM seat_holds
            WHERE showtime_id = $1
              AND seat_id = ANY($2)
              AND user_id <> $3
              AND expires_at > NOW()
            FOR UPDATE
            "#,
        )
        .bind(showtime_id)
        .bind(seat_ids)
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;
        if !foreign.is_empty() {
            // Ничего не выдаём: корзина не должна остаться наполовину занятой
            return Err(ApiError::Conflict { seat_ids: foreign });
        }

        // 3) Сносим свои старые блокировки (продление) и просроченные чужие,
        //    иначе уникальный индекс не пустит свежую вставку
        sqlx::query(
            r#"
            DELETE FROM seat_holds
            WHERE showtime_id = $1
              AND seat_id = ANY($2)
              AND (user_id = $3 OR expires_at <= NOW())
            "#,
        )
        .bind(showtime_id)
        .bind(seat_ids)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        // 4) Свежие блокировки всем набором
        let expires_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO seat_holds (seat_id, showtime_id, user_id, expires_at)
            SELECT unnest($1::bigint[]), $2, $3, NOW() + make_interval(secs => $4)
            RETURNING expires_at
            "#,
        )
        .bind(seat_ids)
        .bind(showtime_id)
        .bind(user_id)
        .bind(HOLD_TTL_SECS as f64)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if unique_violation(&e) {
                // Проигранная гонка под read committed: конкурент вставил
                // блокировку между нашим SELECT и INSERT
                warn!(
                    "hold insert lost a race for showtime {}: {:?}",
                    showtime_id, e
                );
                ApiError::Conflict {
                    seat_ids: seat_ids.to_vec(),
                }
            } else {
                ApiError::Storage(e)
            }
        })?;

        tx.commit().await?;

        info!(
            "holds granted: showtime={} user={} seats={:?} until {}",
            showtime_id, user_id, seat_ids, expires_at
        );

        // Конкуренты сразу видят места серыми
        self.state.hub.publish(
            showtime_id,
            SeatEvent::Held {
                seat_ids: seat_ids.to_vec(),
                user_id,
            },
        );

        Ok(Granted {
            seat_ids: seat_ids.to_vec(),
            expires_at,
            hold_ttl_secs: HOLD_TTL_SECS,
        })
    }

    /// Снять свои блокировки. Идемпотентно: чужие и уже снятые строки
    /// просто не затрагиваются.
    pub async fn release(
        &self,
        showtime_id: i64,
        seat_ids: &[i64],
        user_id: i32,
    ) -> Result<Vec<i64>, ApiError> {
        validate_seat_set(showtime_id, seat_ids)?;

        let released: Vec<i64> = sqlx::query_scalar(
            r#"
            DELETE FROM seat_holds
            WHERE showtime_id = $1 AND seat_id = ANY($2) AND user_id = $3
            RETURNING seat_id
            "#,
        )
        .bind(showtime_id)
        .bind(seat_ids)
        .bind(user_id)
        .fetch_all(&self.state.db.pool)
        .await?;

        if !released.is_empty() {
            info!(
                "holds released: showtime={} user={} seats={:?}",
                showtime_id, user_id, released
            );
            self.state.hub.publish(
                showtime_id,
                SeatEvent::Released {
                    seat_ids: released.clone(),
                },
            );
        }

        Ok(released)
    }
}

fn validate_seat_set(showtime_id: i64, seat_ids: &[i64]) -> Result<(), ApiError> {
    if showtime_id <= 0 {
        return Err(ApiError::Validation("showtime_id должен быть > 0".to_string()));
    }
    if seat_ids.is_empty() {
        return Err(ApiError::Validation("seat_ids не должен быть пустым".to_string()));
    }
    if seat_ids.iter().any(|&id| id <= 0) {
        return Err(ApiError::Validation("seat_id должен быть > 0".to_string()));
    }
    let mut unique = seat_ids.to_vec();
    unique.sort_unstable();
    unique.dedup();
    if unique.len() != seat_ids.len() {
        return Err(ApiError::Validation("seat_ids содержит дубликаты".to_string()));
    }
    Ok(())
}

fn unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_invalid_seat_sets() {
        assert!(validate_seat_set(1, &[]).is_err());
        assert!(validate_seat_set(1, &[0]).is_err());
        assert!(validate_seat_set(0, &[1]).is_err());
        assert!(validate_seat_set(1, &[1, 2, 3]).is_ok());
    }

    #[test]
    fn rejects_duplicate_seat_ids_in_one_request() {
        // Дубликат уронил бы вставку об уникальный индекс уже внутри
        // транзакции; отсекаем раньше
        assert!(validate_seat_set(1, &[5, 5]).is_err());
        assert!(validate_seat_set(1, &[5, 6]).is_ok());
    }
}
