use std::sync::Arc;

use crate::error::AnalysisError;
use crate::models::{AnalysisRequest, AnalyzeFoodBody, NutritionRecord};
use crate::services::{parse_nutrition, NutritionGateway};

/// Turns an analysis request into a validated nutrition record.
///
/// Holds no per-request state, so one instance is shared across all requests.
pub struct AnalysisHandler {
    gateway: Arc<dyn NutritionGateway>,
}

impl AnalysisHandler {
    pub fn new(gateway: Arc<dyn NutritionGateway>) -> Self {
        Self { gateway }
    }

    pub async fn analyze(&self, request: AnalysisRequest) -> Result<NutritionRecord, AnalysisError> {
        match &request {
            AnalysisRequest::ByImage { image_url } => {
                log::info!("📸 Analyzing food image: {}", image_url)
            }
            AnalysisRequest::ByName { food_name } => log::info!("🍽️ Analyzing food: {}", food_name),
        }

        let raw = self.gateway.complete(&request).await?;
        let record = parse_nutrition(&raw)?;

        log::info!(
            "✅ Successfully analyzed food: {} ({} kcal)",
            record.food_name,
            record.calories
        );
        Ok(record)
    }

    /// Validate the wire body, then analyze. Rejected bodies never reach the gateway.
    pub async fn analyze_body(&self, body: AnalyzeFoodBody) -> Result<NutritionRecord, AnalysisError> {
        let request = AnalysisRequest::try_from(body)?;
        self.analyze(request).await
    }
}
