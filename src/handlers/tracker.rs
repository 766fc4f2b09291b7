use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::TrackerError;
use crate::models::{DailySummary, MealRecord, Profile, WaterIntake, WeightSettings};
use crate::services::TrackerStore;

/// Profile, water intake and dashboard operations.
pub struct TrackerService {
    store: Arc<dyn TrackerStore>,
}

impl TrackerService {
    pub fn new(store: Arc<dyn TrackerStore>) -> Self {
        Self { store }
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<Profile, TrackerError> {
        Ok(self.store.ensure_profile(user_id).await?)
    }

    pub async fn update_weight(
        &self,
        user_id: Uuid,
        settings: WeightSettings,
    ) -> Result<Profile, TrackerError> {
        let (current, target) = match (settings.current_weight, settings.target_weight) {
            (Some(current), Some(target)) => (current, target),
            _ => {
                return Err(TrackerError::Invalid(
                    "Please enter both current and target weight".to_string(),
                ))
            }
        };
        if !(current > 0.0 && target > 0.0) {
            return Err(TrackerError::Invalid("Weights must be positive".to_string()));
        }
        if let Some(height) = settings.height {
            if !(height > 0.0) {
                return Err(TrackerError::Invalid("Height must be positive".to_string()));
            }
        }

        self.store.ensure_profile(user_id).await?;
        let profile = self
            .store
            .update_weight(user_id, &settings)
            .await?
            .ok_or_else(|| TrackerError::NotFound(format!("Profile {}", user_id)))?;

        log::info!(
            "⚖️ Weight settings saved for {}: {} kg -> {} kg",
            user_id,
            current,
            target
        );
        Ok(profile)
    }

    pub async fn meals(&self, user_id: Uuid, date: NaiveDate) -> Result<Vec<MealRecord>, TrackerError> {
        Ok(self.store.meals_for_day(user_id, date).await?)
    }

    /// Overwrite the day's water total.
    pub async fn set_water(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        amount: i32,
    ) -> Result<WaterIntake, TrackerError> {
        if amount < 0 {
            return Err(TrackerError::Invalid(
                "Water intake cannot be negative".to_string(),
            ));
        }
        self.store.ensure_profile(user_id).await?;
        let intake = self.store.set_water(user_id, date, amount).await?;
        log::info!("💧 Water intake for {} on {}: {} ml", user_id, date, amount);
        Ok(intake)
    }

    /// Add (or with a negative delta, remove) water from the day's total.
    pub async fn add_water(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        delta: i32,
    ) -> Result<WaterIntake, TrackerError> {
        if delta == 0 {
            return Err(TrackerError::Invalid("Amount must not be zero".to_string()));
        }
        self.store.ensure_profile(user_id).await?;
        match self.store.add_water(user_id, date, delta).await? {
            Some(intake) => {
                log::info!(
                    "💧 Water intake for {} on {}: {:+} ml, now {} ml",
                    user_id,
                    date,
                    delta,
                    intake.amount
                );
                Ok(intake)
            }
            None => {
                let current = self.store.water_for_day(user_id, date).await?;
                Err(TrackerError::Invalid(format!(
                    "Cannot remove {} ml, only {} ml logged",
                    -i64::from(delta),
                    current
                )))
            }
        }
    }

    pub async fn daily_summary(&self, user_id: Uuid, date: NaiveDate) -> Result<DailySummary, TrackerError> {
        let profile = self.store.ensure_profile(user_id).await?;
        let meals = self.store.meals_for_day(user_id, date).await?;
        let water = self.store.water_for_day(user_id, date).await?;

        Ok(DailySummary::build(date, &meals, water, &profile))
    }
}
