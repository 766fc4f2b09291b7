use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::models::{HealthRating, MealRecord, MealType, NutritionRecord, Profile, WaterIntake, WeightSettings};

/// Storage for profiles, meals and daily water intake.
#[async_trait::async_trait]
pub trait TrackerStore: Send + Sync {
    /// Return the user's profile, creating one with default goals on first use.
    async fn ensure_profile(&self, user_id: Uuid) -> Result<Profile>;
    async fn update_weight(&self, user_id: Uuid, settings: &WeightSettings) -> Result<Option<Profile>>;
    async fn insert_meal(&self, meal: &MealRecord) -> Result<()>;
    /// Meals created during the given UTC day, oldest first.
    async fn meals_for_day(&self, user_id: Uuid, date: NaiveDate) -> Result<Vec<MealRecord>>;
    async fn water_for_day(&self, user_id: Uuid, date: NaiveDate) -> Result<i32>;
    async fn set_water(&self, user_id: Uuid, date: NaiveDate, amount: i32) -> Result<WaterIntake>;
    /// Apply `delta` to the day's total in one step. `None` when the total would go below zero.
    async fn add_water(&self, user_id: Uuid, date: NaiveDate, delta: i32) -> Result<Option<WaterIntake>>;
}

pub struct Database {
    pool: PgPool,
}

const PROFILE_COLUMNS: &str = "id, username, daily_calorie_goal, daily_water_goal, weight_goal, \
     current_weight, target_weight, height, created_at";

const MEAL_COLUMNS: &str = "id, user_id, food_name, image_url, calories, protein, carbs, fat, \
     vitamins, minerals, serving_size, meal_type, health_rating, notes, created_at";

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let db = Database { pool };
        db.init_tables().await?;
        Ok(db)
    }

    async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id UUID PRIMARY KEY,
                username TEXT,
                daily_calorie_goal INTEGER NOT NULL DEFAULT 2000,
                daily_water_goal INTEGER NOT NULL DEFAULT 2000,
                weight_goal TEXT NOT NULL DEFAULT 'maintain',
                current_weight DOUBLE PRECISION,
                target_weight DOUBLE PRECISION,
                height DOUBLE PRECISION,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meals (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES profiles(id),
                food_name TEXT NOT NULL,
                image_url TEXT,
                calories INTEGER NOT NULL,
                protein DOUBLE PRECISION,
                carbs DOUBLE PRECISION,
                fat DOUBLE PRECISION,
                vitamins TEXT,
                minerals TEXT,
                serving_size TEXT,
                meal_type TEXT NOT NULL,
                health_rating TEXT,
                notes TEXT,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS water_intake (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL REFERENCES profiles(id),
                date DATE NOT NULL,
                amount INTEGER NOT NULL,
                UNIQUE (user_id, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS meals_user_created_idx ON meals (user_id, created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        let profile = sqlx::query(&format!("SELECT {} FROM profiles WHERE id = $1", PROFILE_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| profile_from_row(&row));

        Ok(profile)
    }
}

fn profile_from_row(row: &PgRow) -> Profile {
    Profile {
        id: row.get(0),
        username: row.get(1),
        daily_calorie_goal: row.get(2),
        daily_water_goal: row.get(3),
        weight_goal: row.get(4),
        current_weight: row.get(5),
        target_weight: row.get(6),
        height: row.get(7),
        created_at: row.get(8),
    }
}

fn meal_from_row(row: &PgRow) -> MealRecord {
    let meal_type: String = row.get(11);
    let health_rating: Option<String> = row.get(12);
    let calories: i32 = row.get(4);

    MealRecord {
        id: row.get(0),
        user_id: row.get(1),
        nutrition: NutritionRecord {
            food_name: row.get(2),
            calories: calories.max(0) as u32,
            protein: row.get(5),
            carbs: row.get(6),
            fat: row.get(7),
            health_rating: health_rating.as_deref().and_then(HealthRating::from_string),
            vitamins: row.get(8),
            minerals: row.get(9),
        },
        image_url: row.get(3),
        serving_size: row.get(10),
        meal_type: MealType::from_string(&meal_type).unwrap_or_default(),
        notes: row.get(13),
        created_at: row.get(14),
    }
}

#[async_trait::async_trait]
impl TrackerStore for Database {
    async fn ensure_profile(&self, user_id: Uuid) -> Result<Profile> {
        if let Some(profile) = self.get_profile(user_id).await? {
            return Ok(profile);
        }

        log::info!("👤 Creating profile for {}", user_id);
        let profile = Profile::new(user_id);
        sqlx::query(
            r#"
            INSERT INTO profiles (id, username, daily_calorie_goal, daily_water_goal, weight_goal, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(profile.id)
        .bind(&profile.username)
        .bind(profile.daily_calorie_goal)
        .bind(profile.daily_water_goal)
        .bind(&profile.weight_goal)
        .bind(profile.created_at)
        .execute(&self.pool)
        .await?;

        // Another request may have won the insert race
        self.get_profile(user_id)
            .await?
            .context("Profile missing right after insert")
    }

    async fn update_weight(&self, user_id: Uuid, settings: &WeightSettings) -> Result<Option<Profile>> {
        let profile = sqlx::query(&format!(
            "UPDATE profiles SET current_weight = $2, target_weight = $3, height = $4 \
             WHERE id = $1 RETURNING {}",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .bind(settings.current_weight)
        .bind(settings.target_weight)
        .bind(settings.height)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| profile_from_row(&row));

        Ok(profile)
    }

    async fn insert_meal(&self, meal: &MealRecord) -> Result<()> {
        let n = &meal.nutrition;
        let calories = i32::try_from(n.calories).context("Calorie value does not fit in storage")?;

        sqlx::query(&format!(
            "INSERT INTO meals ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            MEAL_COLUMNS
        ))
        .bind(meal.id)
        .bind(meal.user_id)
        .bind(&n.food_name)
        .bind(&meal.image_url)
        .bind(calories)
        .bind(n.protein)
        .bind(n.carbs)
        .bind(n.fat)
        .bind(&n.vitamins)
        .bind(&n.minerals)
        .bind(&meal.serving_size)
        .bind(meal.meal_type.to_string())
        .bind(n.health_rating.map(|r| r.as_str()))
        .bind(&meal.notes)
        .bind(meal.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn meals_for_day(&self, user_id: Uuid, date: NaiveDate) -> Result<Vec<MealRecord>> {
        let (start, end) = day_bounds(date)?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM meals WHERE user_id = $1 AND created_at >= $2 AND created_at < $3 \
             ORDER BY created_at ASC",
            MEAL_COLUMNS
        ))
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(meal_from_row).collect())
    }

    async fn water_for_day(&self, user_id: Uuid, date: NaiveDate) -> Result<i32> {
        let amount = sqlx::query("SELECT amount FROM water_intake WHERE user_id = $1 AND date = $2")
            .bind(user_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.get::<i32, _>(0))
            .unwrap_or(0);

        Ok(amount)
    }

    async fn set_water(&self, user_id: Uuid, date: NaiveDate, amount: i32) -> Result<WaterIntake> {
        sqlx::query(
            r#"
            INSERT INTO water_intake (id, user_id, date, amount)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, date) DO UPDATE SET amount = EXCLUDED.amount
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(date)
        .bind(amount)
        .execute(&self.pool)
        .await?;

        Ok(WaterIntake { user_id, date, amount })
    }

    async fn add_water(&self, user_id: Uuid, date: NaiveDate, delta: i32) -> Result<Option<WaterIntake>> {
        // Removing water never creates a row
        let row = if delta < 0 {
            sqlx::query(
                r#"
                UPDATE water_intake SET amount = amount + $3
                WHERE user_id = $1 AND date = $2 AND amount + $3 >= 0
                RETURNING amount
                "#,
            )
            .bind(user_id)
            .bind(date)
            .bind(delta)
            .fetch_optional(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"
                INSERT INTO water_intake (id, user_id, date, amount)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_id, date) DO UPDATE SET amount = water_intake.amount + EXCLUDED.amount
                RETURNING amount
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(date)
            .bind(delta)
            .fetch_optional(&self.pool)
            .await
        }
        .context("Failed to update water intake")?;

        let amount = row.map(|row| row.get::<i32, _>(0));
        Ok(amount.map(|amount| WaterIntake { user_id, date, amount }))
    }
}

/// Half-open UTC range `[date 00:00, next day 00:00)`.
fn day_bounds(date: NaiveDate) -> Result<(chrono::DateTime<Utc>, chrono::DateTime<Utc>)> {
    let start = date
        .and_hms_opt(0, 0, 0)
        .context("Invalid date")?
        .and_utc();
    let next = date.succ_opt().context("Date out of range")?;
    let end = next.and_hms_opt(0, 0, 0).context("Invalid date")?.and_utc();
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_bounds() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let (start, end) = day_bounds(date).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-02-29T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }
}
