use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AnalysisError;

/// Structured nutrition data extracted from a model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionRecord {
    pub food_name: String,
    pub calories: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_rating: Option<HealthRating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitamins: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minerals: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthRating {
    Good,
    Average,
    Poor,
}

impl HealthRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthRating::Good => "good",
            HealthRating::Average => "average",
            HealthRating::Poor => "poor",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "good" => Some(HealthRating::Good),
            "average" => Some(HealthRating::Average),
            "poor" => Some(HealthRating::Poor),
            _ => None,
        }
    }
}

/// What the model should look at: an uploaded image or a food description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisRequest {
    ByImage { image_url: String },
    ByName { food_name: String },
}

/// Wire shape of the analysis body. Both fields are nullable on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeFoodBody {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub food_name: Option<String>,
}

impl TryFrom<AnalyzeFoodBody> for AnalysisRequest {
    type Error = AnalysisError;

    fn try_from(body: AnalyzeFoodBody) -> Result<Self, Self::Error> {
        // Blank strings count as absent
        let image_url = body.image_url.filter(|s| !s.trim().is_empty());
        let food_name = body.food_name.filter(|s| !s.trim().is_empty());

        match (image_url, food_name) {
            (Some(image_url), None) => Ok(AnalysisRequest::ByImage { image_url }),
            (None, Some(food_name)) => Ok(AnalysisRequest::ByName {
                food_name: food_name.trim().to_string(),
            }),
            (Some(_), Some(_)) => Err(AnalysisError::InvalidRequest(
                "Provide either imageUrl or foodName, not both".to_string(),
            )),
            (None, None) => Err(AnalysisError::InvalidRequest(
                "Either imageUrl or foodName must be provided".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    #[default]
    Lunch,
    Dinner,
    Snack,
}

impl std::fmt::Display for MealType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
            MealType::Snack => "snack",
        };
        write!(f, "{}", s)
    }
}

impl MealType {
    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "breakfast" => Some(MealType::Breakfast),
            "lunch" => Some(MealType::Lunch),
            "dinner" => Some(MealType::Dinner),
            "snack" => Some(MealType::Snack),
            _ => None,
        }
    }
}

/// A persisted meal: the analysis result plus what the user told us about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(flatten)]
    pub nutrition: NutritionRecord,
    pub image_url: Option<String>,
    pub serving_size: Option<String>,
    pub meal_type: MealType,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for logging a meal through analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMealInput {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub food_name: Option<String>,
    #[serde(default)]
    pub serving_size: Option<String>,
    #[serde(default)]
    pub meal_type: MealType,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub username: Option<String>,
    pub daily_calorie_goal: i32,
    pub daily_water_goal: i32,
    pub weight_goal: String,
    pub current_weight: Option<f64>,
    pub target_weight: Option<f64>,
    pub height: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub const DEFAULT_CALORIE_GOAL: i32 = 2000;
    pub const DEFAULT_WATER_GOAL: i32 = 2000;
    pub const DEFAULT_WEIGHT_GOAL: &'static str = "maintain";

    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            username: None,
            daily_calorie_goal: Self::DEFAULT_CALORIE_GOAL,
            daily_water_goal: Self::DEFAULT_WATER_GOAL,
            weight_goal: Self::DEFAULT_WEIGHT_GOAL.to_string(),
            current_weight: None,
            target_weight: None,
            height: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightSettings {
    pub current_weight: Option<f64>,
    pub target_weight: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterIntake {
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub amount: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_calories: i64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub meals_count: usize,
    pub water_intake: i32,
    pub calorie_goal: i32,
    pub water_goal: i32,
    pub water_remaining: i32,
    pub calorie_progress: i32,
    pub water_progress: i32,
}

impl DailySummary {
    pub fn build(date: NaiveDate, meals: &[MealRecord], water_intake: i32, profile: &Profile) -> Self {
        let mut summary = DailySummary {
            date,
            total_calories: 0,
            total_protein: 0.0,
            total_carbs: 0.0,
            total_fat: 0.0,
            meals_count: meals.len(),
            water_intake,
            calorie_goal: profile.daily_calorie_goal,
            water_goal: profile.daily_water_goal,
            water_remaining: (profile.daily_water_goal - water_intake).max(0),
            calorie_progress: 0,
            water_progress: progress_percentage(water_intake as f64, profile.daily_water_goal as f64),
        };

        for meal in meals {
            let n = &meal.nutrition;
            summary.total_calories += i64::from(n.calories);
            summary.total_protein += n.protein.unwrap_or(0.0);
            summary.total_carbs += n.carbs.unwrap_or(0.0);
            summary.total_fat += n.fat.unwrap_or(0.0);
        }

        summary.calorie_progress =
            progress_percentage(summary.total_calories as f64, profile.daily_calorie_goal as f64);
        summary
    }
}

/// Percentage of `goal` reached, capped at 100. A non-positive goal counts as reached.
fn progress_percentage(current: f64, goal: f64) -> i32 {
    if goal <= 0.0 {
        return 100;
    }
    ((current / goal) * 100.0).clamp(0.0, 100.0) as i32
}
