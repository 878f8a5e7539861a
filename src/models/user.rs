use serde::Serialize;
use sqlx::FromRow;
use chrono::NaiveDateTime;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub user_id: i32,
    pub email: String,
    pub password_plain: Option<String>, // For testing only
    pub first_name: String,
    pub surname: String,
    pub stars: i32,
    pub is_active: bool,
    pub registered_at: NaiveDateTime,
}

impl User {
    // Найти пользователя по email
    pub async fn find_by_email(email: &str, db: &crate::database::Database) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT user_id, email, password_plain, first_name, surname, stars, is_active, registered_at
             FROM users WHERE email = $1"
        )
        .bind(email)
        .fetch_optional(&db.pool)
        .await
    }

    // Проверить пароль (plain-пароль, в продакшене здесь был бы bcrypt)
    pub fn verify_password(&self, password: &str) -> bool {
        self.password_plain.as_deref() == Some(password)
    }
}
