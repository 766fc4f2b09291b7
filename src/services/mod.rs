pub mod database;
pub mod gateway; // AI gateway chat-completion client
pub mod image_store;
pub mod parser; // Nutrition JSON extraction from model output

pub use database::{Database, TrackerStore};
pub use gateway::{GatewayClient, NutritionGateway};
pub use image_store::ImageStore;
pub use parser::parse_nutrition;
