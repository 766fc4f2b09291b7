pub mod analysis;
pub mod meal_logger;
pub mod tracker;

pub use analysis::AnalysisHandler;
pub use meal_logger::MealLogger;
pub use tracker::TrackerService;
