use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::TrackerError;
use crate::handlers::AnalysisHandler;
use crate::models::{AnalyzeFoodBody, LogMealInput, MealRecord};
use crate::services::TrackerStore;

/// Analyzes a meal and saves the result to the user's log.
pub struct MealLogger {
    analysis: Arc<AnalysisHandler>,
    store: Arc<dyn TrackerStore>,
}

impl MealLogger {
    pub fn new(analysis: Arc<AnalysisHandler>, store: Arc<dyn TrackerStore>) -> Self {
        Self { analysis, store }
    }

    pub async fn log_meal(&self, user_id: Uuid, input: LogMealInput) -> Result<MealRecord, TrackerError> {
        let image_url = input.image_url.filter(|s| !s.trim().is_empty());

        let nutrition = self
            .analysis
            .analyze_body(AnalyzeFoodBody {
                image_url: image_url.clone(),
                food_name: input.food_name,
            })
            .await?;

        self.store.ensure_profile(user_id).await?;

        let meal = MealRecord {
            id: Uuid::new_v4(),
            user_id,
            nutrition,
            image_url,
            serving_size: non_blank(input.serving_size),
            meal_type: input.meal_type,
            notes: non_blank(input.notes),
            created_at: Utc::now(),
        };
        self.store.insert_meal(&meal).await?;

        log::info!(
            "🍽️ Meal saved for {}: {} ({} kcal, {})",
            user_id,
            meal.nutrition.food_name,
            meal.nutrition.calories,
            meal.meal_type
        );
        Ok(meal)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
